fn main() {
    if let Err(e) = mcp_popover_bridge_lib::run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
