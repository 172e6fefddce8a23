use sniper_domain::services::telemetry::TelemetryGuard;
use sniper_monitor::SniperSession;

#[derive(Clone)]
pub struct AppState {
    session: SniperSession,
    telemetry: TelemetryGuard,
}

impl AppState {
    pub fn new(session: SniperSession, telemetry: TelemetryGuard) -> Self {
        Self { session, telemetry }
    }

    pub fn session(&self) -> &SniperSession {
        &self.session
    }

    pub fn telemetry(&self) -> &TelemetryGuard {
        &self.telemetry
    }
}
