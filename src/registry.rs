//! Kind-name registration table for constructing blocks by name

use hashbrown::HashMap;
use itertools::Itertools;
use tracing::{debug, error};

use crate::error::{PipelineError, Result};
use crate::node::DspNode;
use crate::nodes::{Downmix, Gain, PassThrough};

type Constructor = Box<dyn Fn() -> Box<dyn DspNode> + Send + Sync>;

/// Maps a block kind name to a constructor.
///
/// Lets a pipeline be assembled from names (say, read from a config file)
/// without the pipeline knowing about concrete node types.
///
/// ```
/// use dspblock::{NodeRegistry, Pipeline};
///
/// let mut registry = NodeRegistry::with_builtin();
/// registry.register("mute", || dspblock::nodes::Gain::new(0.0));
///
/// let mut pipeline = Pipeline::new();
/// let mute = pipeline.add_registered(&registry, "mute-1", "mute")?;
/// assert_eq!(pipeline.kind(mute)?, "mute");
/// # Ok::<(), dspblock::PipelineError>(())
/// ```
#[derive(Default)]
pub struct NodeRegistry {
    constructors: HashMap<String, Constructor>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the parameterless built-in nodes
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("passthrough", || PassThrough);
        registry.register("gain", || Gain::new(1.0));
        registry.register("downmix", || Downmix);
        registry
    }

    /// Register `kind`, replacing any previous constructor for it
    pub fn register<N, F>(&mut self, kind: impl Into<String>, constructor: F)
    where
        N: DspNode,
        F: Fn() -> N + Send + Sync + 'static,
    {
        let kind = kind.into();
        debug!(%kind, "registering block kind");
        self.constructors
            .insert(kind, Box::new(move || Box::new(constructor()) as Box<dyn DspNode>));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    /// Registered kind names, sorted
    pub fn kinds(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).sorted().collect_vec()
    }

    pub fn create(&self, kind: &str) -> Result<Box<dyn DspNode>> {
        match self.constructors.get(kind) {
            Some(constructor) => Ok(constructor()),
            None => {
                error!(%kind, "unknown block kind");
                Err(PipelineError::UnknownKind(kind.to_string()))
            }
        }
    }
}
