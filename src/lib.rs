/*!

A pure-Rust implementation of the Garmin device-transfer protocol family,
for talking to consumer GPS units over a serial port or USB.

The protocol is a three-layer stack.  At the bottom, a physical transport
moves bytes (serial) or packets (USB); this crate ships no OS driver and
instead binds whatever the caller provides through the traits in [`phys`].
Above that, a link layer turns the wire into reliable packets: DLE/ETX
framing with checksums and ACK/NAK on serial, a thin pass-through on USB.
At the top, the application protocols run their transfer state machines
over typed records, whose binary schemas live in [`records`].

Which application protocols and record formats a given unit speaks is
discovered at session start: every unit answers a product inquiry, newer
ones follow it with a protocol array describing their whole stack, and
older ones are looked up in a built-in catalog by product id and firmware
version.

```no_run
use garlink::link::serial::SerialLink;
use garlink::Session;

# use std::{io, time::Duration};
# struct Port;
# impl garlink::phys::SerialPhys for Port {
#     fn read(&mut self, _: &mut [u8]) -> io::Result<usize> { Ok(0) }
#     fn write_all(&mut self, _: &[u8]) -> io::Result<()> { Ok(()) }
#     fn set_timeout(&mut self, _: Duration) -> io::Result<()> { Ok(()) }
#     fn set_baudrate(&mut self, _: u32) -> io::Result<()> { Ok(()) }
# }
# fn open_port() -> io::Result<Port> { Ok(Port) }
# fn main() -> garlink::Result<()> {
let port = open_port()?;
let mut session = Session::start(SerialLink::new(port))?;
println!("connected to {:?}", session.product_info().description);
for wpt in session.get_waypoints()? {
    println!("{} at {:.5},{:.5}", wpt.ident(),
        wpt.position().lat_degrees(), wpt.position().lon_degrees());
}
# Ok(())
# }
```

*/

pub mod capability;
pub mod catalog;
pub mod command;
mod error;
pub mod link;
pub mod packet;
pub mod phys;
pub mod records;
mod session;
pub mod wire;

pub use capability::{ProductInfo, ProtocolSet, Role};
pub use error::*;
pub use session::{Cancel, PvtStream, Session};
pub use wire::{degrees_to_semicircle, semicircle_to_degrees, Position, RadianPosition};
