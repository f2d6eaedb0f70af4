pub mod adapter;
pub mod classifier;
pub mod drawing;
pub mod feeder;
pub mod gate;
pub mod history;
pub mod lifecycle;
pub mod state;
pub mod state_manager;

pub use adapter::{HandSignal, LandmarkEventAdapter};
pub use classifier::{ClassifierClient, HttpClassifier};
pub use drawing::{DrawingSink, HAND_CONNECTIONS, NullDrawingSink};
pub use feeder::{DetectorSink, FrameFeeder, FrameSink};
pub use gate::{Admission, RequestGate};
pub use history::HistoryBuffer;
pub use lifecycle::{LifecycleController, PipelineBuilder};
pub use state::{PipelineEvent, PipelineSnapshot, PipelineState, PipelineStateMachine};
pub use state_manager::{StateHandle, StateManager};
