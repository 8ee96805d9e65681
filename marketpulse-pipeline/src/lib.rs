//! Pipeline orchestration: configuration, the stream processor, feature
//! and model layers, the train/predict scheduler, producers, and the
//! thread supervisor.

pub mod config;
pub mod features;
pub mod model;
pub mod predictor;
pub mod processor;
pub mod producers;
pub mod scheduler;
pub mod supervisor;
pub mod trainer;

pub use config::{ConfigError, PipelineConfig};
pub use model::{DirectionModel, ModelError};
pub use predictor::{read_predictions, run_prediction, Direction, PredictionRecord};
pub use processor::StreamProcessor;
pub use scheduler::{run_cycle, run_scheduler};
pub use supervisor::{ShutdownFlag, Supervisor, SupervisorReport};
pub use trainer::{run_training, TrainError, TrainReport};
