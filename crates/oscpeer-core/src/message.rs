//! Message construction helpers
//!
//! `rosc` argument values are explicit (`OscType::Int(7)`); the builder lets
//! application code pass native Rust values instead.

use rosc::{OscMessage, OscPacket, OscType};

/// Conversion of native values into OSC arguments
pub trait IntoOscArg {
    fn into_osc_arg(self) -> OscType;
}

macro_rules! into_arg {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl IntoOscArg for $ty {
                fn into_osc_arg(self) -> OscType {
                    OscType::$variant(self.into())
                }
            }
        )*
    };
}

into_arg! {
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    String => String,
    &str => String,
    bool => Bool,
    char => Char,
    Vec<u8> => Blob,
}

impl IntoOscArg for &[u8] {
    fn into_osc_arg(self) -> OscType {
        OscType::Blob(self.to_vec())
    }
}

impl IntoOscArg for OscType {
    fn into_osc_arg(self) -> OscType {
        self
    }
}

/// Builder for OSC messages
///
/// ```
/// use oscpeer_core::MessageBuilder;
///
/// let msg = MessageBuilder::new("/mixer/gain")
///     .arg(3i32)
///     .arg(0.5f32)
///     .arg("main")
///     .build();
/// assert_eq!(msg.args.len(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    addr: String,
    args: Vec<OscType>,
}

impl MessageBuilder {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            args: Vec::new(),
        }
    }

    /// Append an argument
    pub fn arg(mut self, arg: impl IntoOscArg) -> Self {
        self.args.push(arg.into_osc_arg());
        self
    }

    /// Append an array argument
    pub fn array(mut self, items: impl IntoIterator<Item = OscType>) -> Self {
        self.args.push(OscType::Array(rosc::OscArray {
            content: items.into_iter().collect(),
        }));
        self
    }

    pub fn build(self) -> OscMessage {
        OscMessage {
            addr: self.addr,
            args: self.args,
        }
    }

    pub fn into_packet(self) -> OscPacket {
        OscPacket::Message(self.build())
    }
}
