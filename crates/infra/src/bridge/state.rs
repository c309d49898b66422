/// Which side of the bridge a channel serves.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Direction {
    Publish,
    Consume,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Publish => "publish",
            Direction::Consume => "consume",
        }
    }
}

impl core::fmt::Display for Direction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection state of one bridge direction.
///
/// ```text
/// Disconnected ──▶ Connecting ──▶ Connected
///       ▲              │              │
///       │              ▼              │ transport error
///       │          Degraded ──retry──▶ Connecting
///       └─────────────────────────────┘
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum ChannelState {
    /// No handle: initial state, after a failure is detected, or after shutdown.
    #[default]
    Disconnected,
    /// A connect + declare attempt is in flight.
    Connecting,
    /// A declared, live handle exists.
    Connected,
    /// The last attempt failed; waiting out the retry delay.
    Degraded,
}

impl ChannelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelState::Disconnected => "disconnected",
            ChannelState::Connecting => "connecting",
            ChannelState::Connected => "connected",
            ChannelState::Degraded => "degraded",
        }
    }
}

impl core::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
