//! Dump the waypoints (and optionally routes) of a unit whose serial
//! port is bridged to TCP.

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
    /// Also dump routes
    #[arg(long)]
    routes: bool,
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
    for wpt in session.get_waypoints()? {
        let posn = wpt.position();
        println!(
            "{:<12} {:>11.6} {:>11.6}  (D{})",
            wpt.ident(),
            posn.lat_degrees(),
            posn.lon_degrees(),
            wpt.datatype()
        );
    }
    if opts.routes {
        for route in session.get_routes()? {
            println!("route {:?}: {} waypoints", route.header, route.waypoints.len());
        }
    }
    Ok(())
}
