pub mod heartbeat;
pub mod publish;
pub mod subscribe;
pub mod time;
