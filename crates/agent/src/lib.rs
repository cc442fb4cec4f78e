//! The relay's agent loop — the heart of threadline.
//!
//! One relay invocation ("turn") flows through this crate:
//!
//! 1. **Append** the caller's new messages to the transcript store, then
//!    read back the full ordered transcript
//! 2. **Stream** the transcript to the provider; the [`DeltaReconstructor`]
//!    folds delta fragments into complete assistant messages while
//!    re-emitting live [`StreamEvent`]s
//! 3. **If tool calls**: the [`ToolDispatcher`] executes them (the
//!    distinguished `idle` call is a pure control signal), results are
//!    appended in call order, and the loop goes back to step 2
//! 4. **Terminate** on a text-only completion, an idle signal, or the
//!    iteration budget — always with exactly one terminal event

pub mod dispatcher;
pub mod loop_runner;
pub mod reconstructor;
pub mod sanitize;
pub mod stream_event;
pub mod view;

pub use dispatcher::{Dispatch, ParsedCall, ToolDispatcher, IDLE_TOOL_NAME};
pub use loop_runner::{AgentLoop, RunOptions, ThreadLocks};
pub use reconstructor::{DeltaReconstructor, StepOutput};
pub use sanitize::sanitize_for_provider;
pub use stream_event::StreamEvent;
pub use view::{RenderOp, ViewState};
