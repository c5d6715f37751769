//! Send one OSC message over UDP and print whatever comes back.
//!
//! Run against any OSC endpoint on localhost:8001, e.g. a softsynth or a
//! second copy of this example with the ports swapped.

use std::time::Duration;

use oscpeer::{MessageBuilder, PeerBuilder};

#[tokio::main]
async fn main() -> oscpeer::Result<()> {
    tracing_subscriber::fmt::init();

    let peer = PeerBuilder::new("127.0.0.1", 8001)
        .udp("127.0.0.1", 9002)
        .build()?;

    peer.dispatcher().add_default_handler(|message| {
        println!("received {} {:?}", message.addr, message.args);
    });
    peer.start_listening().await?;

    let message = MessageBuilder::new("/test/message")
        .arg(42i32)
        .arg("Hello_World!")
        .build();
    peer.send(&message).await?;

    tokio::time::sleep(Duration::from_secs(2)).await;
    peer.stop_listening().await;
    Ok(())
}
