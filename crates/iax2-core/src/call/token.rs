//! Call identity

use std::fmt;
use std::net::SocketAddr;

/// Remote address plus the remote-assigned source call number.
///
/// An answering processor knows its token from the first NEW. An originating
/// processor only learns it from the first reply, so the registry keys calls
/// by local call number first and by token once it is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallToken {
    address: SocketAddr,
    remote_call_number: u16,
}

impl CallToken {
    pub fn new(address: SocketAddr, remote_call_number: u16) -> Self {
        Self {
            address,
            remote_call_number,
        }
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn remote_call_number(&self) -> u16 {
        self.remote_call_number
    }
}

impl fmt::Display for CallToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.remote_call_number)
    }
}

/// Which side started the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallRole {
    /// We send NEW
    Originating,
    /// The remote sent NEW
    Answering,
    /// No call at all, used for registration exchanges
    Registration,
}
