use crate::heal::Resolver;
use crate::monitor::StatusHandle;

#[derive(Clone)]
pub struct AppState {
    pub resolver: Resolver,
    pub status: StatusHandle,
}
