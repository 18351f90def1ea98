pub mod outbox;
pub mod random;
pub mod service;

pub use outbox::{Envelope, FanOut, FanOutMethod, Outbox, OutboxReceiver, IDEMPOTENCY_KEY_HEADER};
pub use random::{RandomSource, ScriptedRandom, ThreadRandom};
pub use service::ServiceKind;
