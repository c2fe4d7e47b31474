use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{pipeline} pipeline has been terminated")]
    PipelineTerminated { pipeline: &'static str },
    #[error("failed to start {pipeline} worker: {source}")]
    WorkerSpawn {
        pipeline: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("failed to render configuration: {0}")]
    ConfigRender(#[from] toml::ser::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
