//! Real-time loop engine
//!
//! Everything in this module runs inside the audio callback, so nothing here
//! allocates, blocks or takes a lock once construction is done.
//!
//! ```text
//!  command_channel()                            event_channel()
//! ┌──────────────┐  EngineCommand   ┌──────────────┐  EngineEvent   ┌──────────────┐
//! │  Controller  │─────push()──────►│  LoopEngine  │─────push()────►│  Event pump  │
//! │ (tokio task) │                  │(audio thread)│                │ (tokio task) │
//! └──────────────┘                  └──────┬───────┘                └──────────────┘
//!                                          │ Relaxed stores
//!                                          ▼
//!                                   ┌──────────────┐
//!                                   │ LoopAtomics  │  lock-free snapshot reads
//!                                   └──────────────┘
//! ```

mod command;
mod gain;
mod layers;
mod looper;
mod state;

pub use command::{
    command_channel, event_channel, EngineCommand, EngineEvent, COMMAND_QUEUE_CAPACITY,
    EVENT_QUEUE_CAPACITY,
};
pub use gain::{GainParam, GainStage};
pub use layers::LayerStack;
pub use looper::{EngineOptions, LoopAtomics, LoopEngine, MAX_PROGRESS};
pub use state::EngineState;
