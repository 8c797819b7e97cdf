// Port discovery
//
// Lists the serial ports the OS reports, marking USB adapters.

use pmod_ad1_rs::PmodConnector;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let ports = PmodConnector::available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found. Please connect the module and try again.");
        return Ok(());
    }

    println!("Found {} port(s):", ports.len());
    for (i, port) in ports.iter().enumerate() {
        let kind = if port.usb { "usb" } else { "other" };
        println!("  {}. {} at {} [{}]", i + 1, port.name, port.port, kind);
    }
    Ok(())
}
