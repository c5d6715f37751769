//! Send one OSC message over TCP with SLIP framing.
//!
//! The connection is opened on the first send; replies from the remote are
//! dispatched from the same stream.

use std::time::Duration;

use oscpeer::{Framing, MessageBuilder, PeerBuilder};

#[tokio::main]
async fn main() -> oscpeer::Result<()> {
    tracing_subscriber::fmt::init();

    let peer = PeerBuilder::new("127.0.0.1", 8001)
        .tcp()
        .framing(Framing::Osc10)
        .build()?;

    peer.dispatcher().add_default_handler(|message| {
        println!("received {} {:?}", message.addr, message.args);
    });
    peer.start_listening().await?;

    let message = MessageBuilder::new("/test/message")
        .arg(42i32)
        .arg("Hello".to_string())
        .build();
    peer.send(&message).await?;

    tokio::time::sleep(Duration::from_secs(2)).await;
    peer.stop_listening().await;
    Ok(())
}
