pub mod automation;
pub mod cdp;
pub mod chrome;
