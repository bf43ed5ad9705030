/// Connection lifecycle. See the transition table this type implements in
/// [`crate::connection`]: PENDING only ever moves forward to ACTIVE; ACTIVE
/// and IDLE cycle with the open-stream count; FULL and CLOSED are sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Pending,
    Ready,
    Active,
    Idle,
    Full,
    Closed,
}
