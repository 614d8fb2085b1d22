//! Identify a unit whose serial port is bridged to TCP (ser2net or
//! similar) and print what it claims to be.

use clap::Parser;
use garlink::link::serial::SerialLink;
use garlink::phys::SerialPhys;
use garlink::Session;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

#[derive(Parser)]
struct Opts {
    /// host:port of the TCP-bridged serial device
    addr: String,
}

struct TcpPort(TcpStream);

impl SerialPhys for TcpPort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.0.write_all(buf)
    }

    fn set_timeout(&mut self, timeout: Duration) -> std::io::Result<()> {
        self.0.set_read_timeout(Some(timeout))
    }

    fn set_baudrate(&mut self, _baud: u32) -> std::io::Result<()> {
        // The bridge owns the physical port speed.
        Ok(())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.flush()
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let opts = Opts::parse();
    let stream = TcpStream::connect(&opts.addr)?;
    let mut session = Session::start(SerialLink::new(TcpPort(stream)))?;
    let info = session.product_info().clone();
    println!("product id: {}", info.product_id);
    println!(
        "firmware:   {}.{:02}",
        info.software_version / 100,
        info.software_version % 100
    );
    for line in info.description.iter().chain(&info.extended) {
        println!("            {line}");
    }
    match session.get_unit_id() {
        Ok(id) => println!("unit id:    {id}"),
        Err(e) => println!("unit id:    unavailable ({e})"),
    }
    Ok(())
}
