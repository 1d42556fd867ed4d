use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

impl StatusMessage {
    pub fn new(message: impl Into<String>, severity: MessageSeverity) -> Self {
        Self {
            message: message.into(),
            severity,
        }
    }
}

/// Events surfaced to whatever owns the peripheral (UI, CLI, tests)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeripheralEvent {
    Status(StatusMessage),
    ServiceAdded(Uuid),
    /// Registration of this service failed; `dropped` services were discarded
    RegistrationFailed { service: Uuid, dropped: usize },
    DeviceConnected(String),
    DeviceDisconnected(String),
    SimulationStarted,
    SimulationStopped,
}
