//! Block pipeline - owns blocks and the producer -> consumer wiring

use itertools::Itertools;
use petgraph::algo::has_path_connecting;
use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::visit::Dfs;
use petgraph::Direction;
use tracing::{debug, error};

use crate::block::{Block, BlockProfile};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::node::{DspNode, Format, Sample};
use crate::registry::NodeRegistry;

type InnerGraph = StableGraph<Block, ()>;

/// Identifier of a block within a [`Pipeline`].
///
/// Ids of removed blocks stay invalid even if the arena reuses the slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct BlockId {
    index: NodeIndex,
    serial: u64,
}

/// A synchronous graph of processing blocks.
///
/// Every block belongs to the pipeline; edges only refer to blocks by id.
/// A block has at most one producer and any number of consumers, which are
/// run in the order they were connected.
///
/// ```
/// use dspblock::nodes::{Decimator, PassThrough};
/// use dspblock::{Format, Pipeline, PipelineConfig};
///
/// let mut pipeline = Pipeline::with_config(
///     PipelineConfig::default().with_format(Format::new(48000, 2)),
/// );
/// let source = pipeline.add_source("iq", PassThrough);
/// let decim = pipeline.add("decim", Decimator::new(3));
/// pipeline.connect(source, decim)?;
/// pipeline.start(source)?;
///
/// pipeline.run(source, &[0.0; 960])?;
/// assert_eq!(pipeline.buffer(decim)?.len(), 320);
/// # Ok::<(), dspblock::PipelineError>(())
/// ```
pub struct Pipeline {
    graph: InnerGraph,
    config: PipelineConfig,
    next_serial: u64,

    /// (block, its producer) pairs still to run in the current tick
    run_stack: Vec<(NodeIndex, NodeIndex)>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::with_config(PipelineConfig::default())
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        Self {
            graph: InnerGraph::with_capacity(16, 16),
            config,
            next_serial: 0,
            run_stack: Vec::with_capacity(16),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Number of blocks in the pipeline
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Add a processing block
    pub fn add<N: DspNode>(&mut self, name: impl Into<String>, node: N) -> BlockId {
        let kind = node.kind().to_string();
        self.insert(name.into(), kind, Box::new(node), None)
    }

    /// Add a source block, fed externally in chunks of
    /// [`chunk_size`](Self::chunk_size) frames
    pub fn add_source<N: DspNode>(&mut self, name: impl Into<String>, node: N) -> BlockId {
        let kind = node.kind().to_string();
        let chunk = self.config.default_chunk_size;
        self.insert(name.into(), kind, Box::new(node), Some(chunk))
    }

    /// Add a block constructed from a registered kind
    pub fn add_registered(
        &mut self,
        registry: &NodeRegistry,
        name: impl Into<String>,
        kind: &str,
    ) -> Result<BlockId> {
        let node = registry.create(kind)?;
        Ok(self.insert(name.into(), kind.to_string(), node, None))
    }

    /// Add a source constructed from a registered kind
    pub fn add_registered_source(
        &mut self,
        registry: &NodeRegistry,
        name: impl Into<String>,
        kind: &str,
    ) -> Result<BlockId> {
        let node = registry.create(kind)?;
        let chunk = self.config.default_chunk_size;
        Ok(self.insert(name.into(), kind.to_string(), node, Some(chunk)))
    }

    fn insert(
        &mut self,
        name: String,
        kind: String,
        node: Box<dyn DspNode>,
        chunk_size: Option<usize>,
    ) -> BlockId {
        let serial = self.next_serial;
        self.next_serial += 1;

        debug!(block = %name, %kind, source = chunk_size.is_some(), "adding block");
        let block = Block::new(
            serial,
            name,
            kind,
            node,
            self.config.default_format,
            chunk_size,
            self.config.profiling,
        );
        let index = self.graph.add_node(block);
        BlockId { index, serial }
    }

    /// Remove a block, stopping it (and everything downstream) first if it
    /// is running. Its edges go with it; former consumers become roots.
    pub fn remove(&mut self, id: BlockId) -> Result<()> {
        let index = self.index(id)?;
        if self.graph[index].is_running() {
            self.stop_index(index);
        }

        if let Some(block) = self.graph.remove_node(index) {
            debug!(block = %block.name(), kind = %block.kind(), "removed block");
        }
        Ok(())
    }

    fn index(&self, id: BlockId) -> Result<NodeIndex> {
        match self.graph.node_weight(id.index) {
            Some(block) if block.serial == id.serial => Ok(id.index),
            _ => Err(PipelineError::UnknownBlock(id)),
        }
    }

    fn block(&self, id: BlockId) -> Result<&Block> {
        let index = self.index(id)?;
        Ok(&self.graph[index])
    }

    fn block_mut(&mut self, id: BlockId) -> Result<&mut Block> {
        let index = self.index(id)?;
        Ok(&mut self.graph[index])
    }

    fn id_of(&self, index: NodeIndex) -> BlockId {
        BlockId {
            index,
            serial: self.graph[index].serial,
        }
    }

    /// Consumers in connection order. Petgraph lists the newest edge first.
    fn consumer_indices(&self, index: NodeIndex) -> Vec<NodeIndex> {
        let mut consumers = self
            .graph
            .neighbors_directed(index, Direction::Outgoing)
            .collect_vec();
        consumers.reverse();
        consumers
    }

    /// Register `consumer` to receive `producer`'s output.
    ///
    /// If `producer` is running, `consumer` inherits its output format and
    /// is started before the edge is added.
    pub fn connect(&mut self, producer: BlockId, consumer: BlockId) -> Result<()> {
        let p = self.index(producer)?;
        let c = self.index(consumer)?;
        let producer_name = self.graph[p].name().to_string();
        let consumer_name = self.graph[c].name().to_string();

        if self.graph.find_edge(p, c).is_some() {
            error!(
                consumer = %consumer_name,
                producer = %producer_name,
                "block already connected"
            );
            return Err(PipelineError::DuplicateEdge {
                producer: producer_name,
                consumer: consumer_name,
            });
        }

        if p == c || has_path_connecting(&self.graph, c, p, None) {
            error!(consumer = %consumer_name, producer = %producer_name, "connection would create a cycle");
            return Err(PipelineError::WouldCycle {
                producer: producer_name,
                consumer: consumer_name,
            });
        }

        if self
            .graph
            .neighbors_directed(c, Direction::Incoming)
            .next()
            .is_some()
        {
            error!(consumer = %consumer_name, producer = %producer_name, "block already has a producer");
            return Err(PipelineError::FanIn {
                producer: producer_name,
                consumer: consumer_name,
            });
        }

        if self.graph[p].is_running() {
            // start downstream
            if let Err(source) = self
                .feed_format(p, c)
                .and_then(|()| self.start_index(c))
            {
                error!(consumer = %consumer_name, producer = %producer_name, "consumer failed to start");
                return Err(PipelineError::DownstreamStartFailed {
                    block: producer_name,
                    source: Box::new(source),
                });
            }
        }

        self.graph.add_edge(p, c, ());
        debug!(consumer = %consumer_name, producer = %producer_name, "added consumer");
        Ok(())
    }

    /// Detach `consumer` from `producer`, stopping it first if the producer
    /// is running. Does nothing if the edge doesn't exist.
    pub fn disconnect(&mut self, producer: BlockId, consumer: BlockId) -> Result<()> {
        let p = self.index(producer)?;
        let c = self.index(consumer)?;

        let edge = match self.graph.find_edge(p, c) {
            Some(edge) => edge,
            None => {
                debug!(
                    consumer = %self.graph[c].name(),
                    producer = %self.graph[p].name(),
                    "not connected, nothing to remove"
                );
                return Ok(());
            }
        };

        if self.graph[p].is_running() {
            // stop downstream
            self.stop_index(c);
        }

        self.graph.remove_edge(edge);
        debug!(
            consumer = %self.graph[c].name(),
            producer = %self.graph[p].name(),
            "removed consumer"
        );
        Ok(())
    }

    /// Start `id` and everything downstream of it.
    ///
    /// All or nothing: if any block in the subtree fails to start, the whole
    /// subtree (including `id`) is stopped again and the error returned.
    pub fn start(&mut self, id: BlockId) -> Result<()> {
        let index = self.index(id)?;
        self.start_index(index)
    }

    fn start_index(&mut self, index: NodeIndex) -> Result<()> {
        let block = &mut self.graph[index];
        if block.is_running() {
            debug!(block = %block.name(), kind = %block.kind(), "block already running");
            return Ok(());
        }
        block.activate()?;

        // cascade this block's output configuration to all consumers
        for consumer in self.consumer_indices(index) {
            if let Err(source) = self
                .feed_format(index, consumer)
                .and_then(|()| self.start_index(consumer))
            {
                let name = self.graph[index].name().to_string();
                error!(block = %name, "downstream failed to start - aborting pipeline");
                self.stop_index(index);
                return Err(PipelineError::DownstreamStartFailed {
                    block: name,
                    source: Box::new(source),
                });
            }
        }

        Ok(())
    }

    /// Hand `producer`'s output format to `consumer`. A consumer that is
    /// already running keeps its format, so it has to match.
    fn feed_format(&mut self, producer: NodeIndex, consumer: NodeIndex) -> Result<()> {
        let expected = self.graph[producer].output();
        let block = &mut self.graph[consumer];
        if !block.is_running() {
            block.set_input_format(expected);
            return Ok(());
        }

        let got = block.input();
        if got == expected {
            return Ok(());
        }

        let producer = self.graph[producer].name().to_string();
        let consumer = self.graph[consumer].name().to_string();
        error!(%consumer, %producer, %expected, %got, "running consumer has a different format");
        Err(PipelineError::FormatMismatch {
            producer,
            consumer,
            expected,
            got,
        })
    }

    /// Stop `id` and everything downstream of it, consumers first, and free
    /// their buffers. Safe to call on a stopped block.
    pub fn stop(&mut self, id: BlockId) -> Result<()> {
        let index = self.index(id)?;
        self.stop_index(index);
        Ok(())
    }

    fn stop_index(&mut self, index: NodeIndex) {
        for consumer in self.consumer_indices(index) {
            self.stop_index(consumer);
        }
        self.graph[index].deactivate();
    }

    /// Push one input buffer through `id` and, depth first, all of its
    /// consumers.
    ///
    /// Stops at the first failure. Nothing is rolled back and every block
    /// stays running; whether to stop the pipeline is up to the caller. A
    /// downstream failure names the producer of the block that failed.
    pub fn run(&mut self, id: BlockId, input: &[Sample]) -> Result<()> {
        let root = self.index(id)?;

        let mut stack = core::mem::take(&mut self.run_stack);
        stack.clear();
        let result = self.run_from(root, input, &mut stack);
        self.run_stack = stack;
        result
    }

    fn run_from(
        &mut self,
        root: NodeIndex,
        input: &[Sample],
        stack: &mut Vec<(NodeIndex, NodeIndex)>,
    ) -> Result<()> {
        self.graph[root].process(input)?;
        // newest edge is listed first, so the oldest consumer pops first
        stack.extend(
            self.graph
                .neighbors_directed(root, Direction::Outgoing)
                .map(|c| (c, root)),
        );

        while let Some((index, producer)) = stack.pop() {
            // a consumer never reaches its producer, so lending is safe
            let upstream = core::mem::take(&mut self.graph[producer].buffer);
            let outcome = self.graph[index].process(&upstream);
            self.graph[producer].buffer = upstream;

            if let Err(source) = outcome {
                return Err(PipelineError::DownstreamRunFailed {
                    block: self.graph[producer].name().to_string(),
                    source: Box::new(source),
                });
            }

            stack.extend(
                self.graph
                    .neighbors_directed(index, Direction::Outgoing)
                    .map(|c| (c, index)),
            );
        }

        Ok(())
    }

    /// Set the input sample rate. Ignored while the block is running.
    pub fn set_sample_rate(&mut self, id: BlockId, rate: u32) -> Result<()> {
        self.block_mut(id)?.set_sample_rate(rate);
        Ok(())
    }

    /// Set the input channel count. Ignored while the block is running.
    pub fn set_channels(&mut self, id: BlockId, channels: u32) -> Result<()> {
        self.block_mut(id)?.set_channels(channels);
        Ok(())
    }

    /// Set a source's chunk size in frames. Ignored while it is running.
    pub fn set_chunk_size(&mut self, id: BlockId, frames: usize) -> Result<()> {
        let block = self.block_mut(id)?;
        if block.set_chunk_size(frames) {
            Ok(())
        } else {
            Err(PipelineError::NotASource(block.name().to_string()))
        }
    }

    /// Enable or disable timing counters for one block.
    pub fn set_profiling(&mut self, id: BlockId, enabled: bool) -> Result<()> {
        self.block_mut(id)?.set_profiling(enabled);
        Ok(())
    }

    pub fn name(&self, id: BlockId) -> Result<&str> {
        Ok(self.block(id)?.name())
    }

    pub fn kind(&self, id: BlockId) -> Result<&str> {
        Ok(self.block(id)?.kind())
    }

    pub fn is_running(&self, id: BlockId) -> Result<bool> {
        Ok(self.block(id)?.is_running())
    }

    pub fn input_format(&self, id: BlockId) -> Result<Format> {
        Ok(self.block(id)?.input())
    }

    /// Output format negotiated by the last start
    pub fn output_format(&self, id: BlockId) -> Result<Format> {
        Ok(self.block(id)?.output())
    }

    pub fn decimation(&self, id: BlockId) -> Result<u32> {
        Ok(self.block(id)?.decimation())
    }

    pub fn interpolation(&self, id: BlockId) -> Result<u32> {
        Ok(self.block(id)?.interpolation())
    }

    /// Output of the block's last run. Empty while stopped.
    pub fn buffer(&self, id: BlockId) -> Result<&[Sample]> {
        Ok(&self.block(id)?.buffer)
    }

    /// `None` for blocks that aren't sources
    pub fn chunk_size(&self, id: BlockId) -> Result<Option<usize>> {
        Ok(self.block(id)?.chunk_size())
    }

    /// Consumers of `id` in the order they are run
    pub fn consumers(&self, id: BlockId) -> Result<Vec<BlockId>> {
        let index = self.index(id)?;
        Ok(self
            .consumer_indices(index)
            .into_iter()
            .map(|c| self.id_of(c))
            .collect_vec())
    }

    pub fn producer(&self, id: BlockId) -> Result<Option<BlockId>> {
        let index = self.index(id)?;
        Ok(self
            .graph
            .neighbors_directed(index, Direction::Incoming)
            .next()
            .map(|p| self.id_of(p)))
    }

    /// Counters accumulated since the block last started
    pub fn profile(&self, id: BlockId) -> Result<BlockProfile> {
        Ok(self.block(id)?.profile())
    }

    /// Nanoseconds spent in this block's own transform
    pub fn self_cost_ns(&self, id: BlockId) -> Result<u64> {
        Ok(self.block(id)?.profile().total_ns)
    }

    /// Nanoseconds spent in this block and everything downstream of it
    pub fn subtree_cost_ns(&self, id: BlockId) -> Result<u64> {
        let index = self.index(id)?;
        Ok(self.fold_subtree(index, |block| block.profile().total_ns))
    }

    pub fn ns_per_frame_one(&self, id: BlockId) -> Result<u64> {
        Ok(self.block(id)?.profile().ns_per_frame())
    }

    /// Summed per-frame cost of this block and everything downstream of it
    pub fn ns_per_frame_all(&self, id: BlockId) -> Result<u64> {
        let index = self.index(id)?;
        Ok(self.fold_subtree(index, |block| {
            let cost = block.profile().ns_per_frame();
            debug!(block = %block.name(), kind = %block.kind(), cost, "ns/frame");
            cost
        }))
    }

    fn fold_subtree(&self, index: NodeIndex, cost: impl Fn(&Block) -> u64) -> u64 {
        let mut total = 0u64;
        let mut dfs = Dfs::new(&self.graph, index);
        while let Some(node) = dfs.next(&self.graph) {
            total = total.saturating_add(cost(&self.graph[node]));
        }
        total
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        let running = self
            .graph
            .node_indices()
            .filter(|&i| self.graph[i].is_running())
            .collect_vec();
        for index in running {
            self.stop_index(index);
        }
    }
}
