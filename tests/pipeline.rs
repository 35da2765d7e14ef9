use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use dspblock::nodes::{Decimator, Downmix, Gain, PassThrough, RtrbSink};
use dspblock::{
    DspNode, Format, InitContext, NodeError, NodeRegistry, Pipeline, PipelineConfig,
    PipelineError, ProcessContext, Pump, Sample,
};
use rtrb::RingBuffer;

type Log = Arc<Mutex<Vec<String>>>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn events(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn count(log: &Log, event: &str) -> usize {
    log.lock().unwrap().iter().filter(|e| *e == event).count()
}

/// Records every hook call; can be told to fail
struct Recorder {
    name: &'static str,
    log: Log,
    fail_init: bool,
    fail_process: bool,
    output_rate: Option<u32>,
}

impl Recorder {
    fn new(name: &'static str, log: &Log) -> Self {
        Self {
            name,
            log: log.clone(),
            fail_init: false,
            fail_process: false,
            output_rate: None,
        }
    }

    fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    fn failing_process(mut self) -> Self {
        self.fail_process = true;
        self
    }

    fn with_output_rate(mut self, rate: u32) -> Self {
        self.output_rate = Some(rate);
        self
    }

    fn record(&self, event: String) {
        self.log.lock().unwrap().push(event);
    }
}

impl DspNode for Recorder {
    fn init(&mut self, ctx: &mut InitContext) -> Result<(), NodeError> {
        self.record(format!("init:{}", self.name));
        if self.fail_init {
            return Err(NodeError::failed("device not found"));
        }
        if let Some(rate) = self.output_rate {
            ctx.output.sample_rate = rate;
        }
        Ok(())
    }

    fn deinit(&mut self) {
        self.record(format!("deinit:{}", self.name));
    }

    fn process(
        &mut self,
        _ctx: &ProcessContext,
        input: &[Sample],
        output: &mut [Sample],
    ) -> Result<(), NodeError> {
        self.record(format!("run:{}:{}", self.name, output.len()));
        if self.fail_process {
            return Err(NodeError::failed("overrun"));
        }
        for (o, i) in output.iter_mut().zip(input) {
            *o = *i;
        }
        Ok(())
    }

    fn kind(&self) -> &str {
        "recorder"
    }
}

fn stereo() -> Pipeline {
    Pipeline::with_config(PipelineConfig::default().with_format(Format::new(48000, 2)))
}

#[test]
fn duplicate_connect_is_rejected() {
    init_tracing();
    let log = Log::default();
    let mut p = stereo();
    let src = p.add_source("src", Recorder::new("src", &log));
    let sink = p.add("sink", Recorder::new("sink", &log));

    p.connect(src, sink).unwrap();
    p.start(src).unwrap();
    assert_eq!(count(&log, "init:sink"), 1);

    let err = p.connect(src, sink).unwrap_err();
    assert!(matches!(err, PipelineError::DuplicateEdge { .. }));
    assert_eq!(p.consumers(src).unwrap(), vec![sink]);
    assert_eq!(count(&log, "init:sink"), 1);
}

#[test]
fn stop_is_idempotent() {
    init_tracing();
    let log = Log::default();
    let mut p = stereo();
    let src = p.add_source("src", Recorder::new("src", &log));

    p.start(src).unwrap();
    p.run(src, &[0.0; 64]).unwrap();
    assert_eq!(p.buffer(src).unwrap().len(), 64);

    p.stop(src).unwrap();
    p.stop(src).unwrap();
    assert!(!p.is_running(src).unwrap());
    assert!(p.buffer(src).unwrap().is_empty());
    assert_eq!(count(&log, "deinit:src"), 1);
}

#[test]
fn start_is_atomic() {
    init_tracing();
    let log = Log::default();
    let mut p = stereo();
    let top = p.add_source("top", Recorder::new("top", &log));
    let mid = p.add("mid", Recorder::new("mid", &log));
    let leaf = p.add("leaf", Recorder::new("leaf", &log).failing_init());
    p.connect(top, mid).unwrap();
    p.connect(mid, leaf).unwrap();

    let err = p.start(top).unwrap_err();
    assert!(matches!(err, PipelineError::DownstreamStartFailed { .. }));
    assert!(matches!(
        err.root_cause(),
        PipelineError::AcquireFailed { block, .. } if block == "leaf"
    ));

    for id in [top, mid, leaf] {
        assert!(!p.is_running(id).unwrap());
        assert!(p.buffer(id).unwrap().is_empty());
    }
    // leaf never started, so only the others are released, consumers first
    assert_eq!(
        events(&log),
        vec!["init:top", "init:mid", "init:leaf", "deinit:mid", "deinit:top"]
    );
}

#[test]
fn unrelated_rates_fail_start() {
    init_tracing();
    let log = Log::default();
    let mut p = stereo();
    let resampler = p.add("resampler", Recorder::new("r", &log).with_output_rate(44100));

    let err = p.start(resampler).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::InvalidRateRelationship { input: 48000, output: 44100, .. }
    ));
    assert!(!p.is_running(resampler).unwrap());
    assert!(p.buffer(resampler).unwrap().is_empty());
    assert_eq!(events(&log), vec!["init:r", "deinit:r"]);
}

#[test]
fn buffer_sized_before_transform() {
    init_tracing();
    let log = Log::default();
    let mut p = stereo();
    let decim = p.add_source("decim", Recorder::new("d", &log).with_output_rate(16000));
    p.start(decim).unwrap();
    assert_eq!(p.decimation(decim).unwrap(), 3);
    assert_eq!(p.interpolation(decim).unwrap(), 1);

    p.run(decim, &[0.0; 960]).unwrap();
    assert_eq!(events(&log).last().unwrap(), "run:d:320");
    assert_eq!(p.buffer(decim).unwrap().len(), 320);
}

#[test]
fn buffer_reused_for_same_frame_count() {
    init_tracing();
    let mut p = stereo();
    let src = p.add_source("src", Gain::new(0.5));
    p.start(src).unwrap();

    p.run(src, &[1.0; 512]).unwrap();
    let first = p.buffer(src).unwrap().as_ptr();
    p.run(src, &[1.0; 512]).unwrap();
    let second = p.buffer(src).unwrap().as_ptr();

    assert_eq!(first, second);
    assert_eq!(p.buffer(src).unwrap().len(), 512);
}

#[test]
fn consumers_run_in_order_and_fail_fast() {
    init_tracing();
    let log = Log::default();
    let mut p = stereo();
    let src = p.add_source("src", Recorder::new("src", &log));
    let a = p.add("a", Recorder::new("a", &log));
    let b = p.add("b", Recorder::new("b", &log).failing_process());
    let c = p.add("c", Recorder::new("c", &log));
    for consumer in [a, b, c] {
        p.connect(src, consumer).unwrap();
    }
    p.start(src).unwrap();
    log.lock().unwrap().clear();

    let err = p.run(src, &[0.0; 8]).unwrap_err();
    assert!(matches!(err, PipelineError::DownstreamRunFailed { ref block, .. } if block == "src"));
    assert!(matches!(
        err.root_cause(),
        PipelineError::TransformFailed { block, .. } if block == "b"
    ));
    assert_eq!(events(&log), vec!["run:src:8", "run:a:8", "run:b:8"]);

    // nothing is rolled back
    for id in [src, a, b, c] {
        assert!(p.is_running(id).unwrap());
    }
}

#[test]
fn traversal_is_depth_first() {
    init_tracing();
    let log = Log::default();
    let mut p = stereo();
    let src = p.add_source("src", Recorder::new("src", &log));
    let a = p.add("a", Recorder::new("a", &log));
    let a1 = p.add("a1", Recorder::new("a1", &log));
    let b = p.add("b", Recorder::new("b", &log));
    p.connect(src, a).unwrap();
    p.connect(a, a1).unwrap();
    p.connect(src, b).unwrap();
    p.start(src).unwrap();
    log.lock().unwrap().clear();

    p.run(src, &[0.0; 4]).unwrap();
    assert_eq!(events(&log), vec!["run:src:4", "run:a:4", "run:a1:4", "run:b:4"]);
}

#[test]
fn run_on_stopped_block_fails() {
    init_tracing();
    let log = Log::default();
    let mut p = stereo();
    let src = p.add_source("src", Recorder::new("src", &log));

    let err = p.run(src, &[0.0; 32]).unwrap_err();
    assert!(matches!(err, PipelineError::NotRunning(ref block) if block == "src"));
    assert!(p.buffer(src).unwrap().is_empty());
    assert!(events(&log).is_empty());
}

#[test]
fn setters_ignored_while_running() {
    init_tracing();
    let mut p = stereo();
    let src = p.add_source("src", PassThrough);
    p.start(src).unwrap();

    p.set_sample_rate(src, 8000).unwrap();
    p.set_channels(src, 1).unwrap();
    assert_eq!(p.input_format(src).unwrap(), Format::new(48000, 2));

    p.stop(src).unwrap();
    p.set_sample_rate(src, 8000).unwrap();
    p.set_channels(src, 1).unwrap();
    assert_eq!(p.input_format(src).unwrap(), Format::new(8000, 1));
}

#[test]
fn connect_while_running_starts_consumer() {
    init_tracing();
    let log = Log::default();
    let mut p = stereo();
    let src = p.add_source("src", Decimator::new(2));
    p.start(src).unwrap();

    let sink = p.add("sink", Recorder::new("sink", &log));
    p.connect(src, sink).unwrap();
    assert!(p.is_running(sink).unwrap());
    assert_eq!(p.input_format(sink).unwrap(), Format::new(24000, 2));

    p.run(src, &[0.0; 16]).unwrap();
    assert_eq!(events(&log), vec!["init:sink", "run:sink:8"]);
}

#[test]
fn failed_start_on_connect_leaves_no_edge() {
    init_tracing();
    let log = Log::default();
    let mut p = stereo();
    let src = p.add_source("src", PassThrough);
    p.start(src).unwrap();

    let sink = p.add("sink", Recorder::new("sink", &log).failing_init());
    let err = p.connect(src, sink).unwrap_err();
    assert!(matches!(err, PipelineError::DownstreamStartFailed { .. }));
    assert!(p.consumers(src).unwrap().is_empty());
    assert!(p.is_running(src).unwrap());
}

#[test]
fn disconnect_while_running_stops_consumer() {
    init_tracing();
    let log = Log::default();
    let mut p = stereo();
    let src = p.add_source("src", PassThrough);
    let sink = p.add("sink", Recorder::new("sink", &log));
    p.connect(src, sink).unwrap();
    p.start(src).unwrap();

    p.disconnect(src, sink).unwrap();
    assert!(!p.is_running(sink).unwrap());
    assert!(p.is_running(src).unwrap());
    assert!(p.consumers(src).unwrap().is_empty());

    p.run(src, &[0.0; 4]).unwrap();
    assert_eq!(count(&log, "run:sink:4"), 0);
}

#[test]
fn profiling_counters() {
    init_tracing();
    let mut p = Pipeline::with_config(
        PipelineConfig::default()
            .with_format(Format::new(48000, 2))
            .with_profiling(true),
    );
    let src = p.add_source("src", PassThrough);
    let down = p.add("down", Decimator::new(2));
    let quiet = p.add("quiet", Gain::new(0.1));
    p.connect(src, down).unwrap();
    p.connect(down, quiet).unwrap();
    p.set_profiling(quiet, false).unwrap();
    p.start(src).unwrap();

    for _ in 0..10 {
        p.run(src, &[0.25; 200]).unwrap();
    }

    let profile = p.profile(down).unwrap();
    assert_eq!(profile.frames_in, 1000);
    assert_eq!(profile.frames_out, 500);
    assert_eq!(p.profile(quiet).unwrap().frames_in, 0);

    let total = p.subtree_cost_ns(src).unwrap();
    let own = p.self_cost_ns(src).unwrap() + p.self_cost_ns(down).unwrap();
    assert_eq!(total, own);
    assert!(p.ns_per_frame_all(src).unwrap() >= p.ns_per_frame_one(src).unwrap());

    // counters reset on start
    p.stop(src).unwrap();
    p.start(src).unwrap();
    assert_eq!(p.profile(down).unwrap().frames_in, 0);
}

#[test]
fn drop_stops_running_blocks() {
    init_tracing();
    let log = Log::default();
    {
        let mut p = stereo();
        let src = p.add_source("src", Recorder::new("src", &log));
        let sink = p.add("sink", Recorder::new("sink", &log));
        p.connect(src, sink).unwrap();
        p.start(src).unwrap();
    }
    assert_eq!(&events(&log)[2..], ["deinit:sink", "deinit:src"]);
}

#[test]
fn registry_pipeline_into_ring_buffer() {
    init_tracing();
    let mut registry = NodeRegistry::with_builtin();
    registry.register("halve", || Decimator::new(2));

    let (producer, mut consumer) = RingBuffer::new(64);
    let mut p = stereo();
    let src = p.add_registered_source(&registry, "iq", "passthrough").unwrap();
    let halve = p.add_registered(&registry, "halve", "halve").unwrap();
    let mono = p.add_registered(&registry, "mono", "downmix").unwrap();
    let sink = p.add("out", RtrbSink::new(producer));
    p.connect(src, halve).unwrap();
    p.connect(halve, mono).unwrap();
    p.connect(mono, sink).unwrap();
    p.start(src).unwrap();

    assert_eq!(p.output_format(mono).unwrap(), Format::new(24000, 1));
    assert_eq!(p.kind(halve).unwrap(), "halve");

    // four stereo frames: (1,3) (5,7) (9,11) (13,15)
    p.run(src, &[1.0, 3.0, 5.0, 7.0, 9.0, 11.0, 13.0, 15.0]).unwrap();

    let mut out = Vec::new();
    while let Ok(sample) = consumer.pop() {
        out.push(sample);
    }
    assert_eq!(out, vec![2.0, 10.0]);

    assert!(matches!(
        p.add_registered(&registry, "x", "fm_demod"),
        Err(PipelineError::UnknownKind(_))
    ));
}

#[test]
fn pump_feeds_chain() {
    init_tracing();
    let (mut capture, queue) = RingBuffer::new(256);
    let (out, listener) = RingBuffer::new(256);

    let mut p = stereo();
    let src = p.add_source("capture", PassThrough);
    let mono = p.add("mono", Downmix);
    let sink = p.add("sink", RtrbSink::new(out));
    p.set_chunk_size(src, 8).unwrap();
    p.connect(src, mono).unwrap();
    p.connect(mono, sink).unwrap();
    p.start(src).unwrap();

    for _ in 0..40 {
        capture.push(1.0).unwrap();
    }

    let mut pump = Pump::new(queue);
    assert_eq!(pump.pump(&mut p, src).unwrap(), 2);
    assert_eq!(pump.queued(), 8);
    assert_eq!(listener.slots(), 16);
}

#[test]
fn downstream_failure_names_direct_producer() {
    init_tracing();
    let log = Log::default();
    let mut p = stereo();
    let src = p.add_source("src", Recorder::new("src", &log));
    let a = p.add("a", Recorder::new("a", &log));
    let b = p.add("b", Recorder::new("b", &log).failing_process());
    p.connect(src, a).unwrap();
    p.connect(a, b).unwrap();
    p.start(src).unwrap();

    let err = p.run(src, &[0.0; 8]).unwrap_err();
    assert!(matches!(err, PipelineError::DownstreamRunFailed { ref block, .. } if block == "a"));
    assert!(matches!(
        err.root_cause(),
        PipelineError::TransformFailed { block, .. } if block == "b"
    ));
}

#[test]
fn full_ring_buffer_drops_whole_chunk() {
    init_tracing();
    let (out, listener) = RingBuffer::new(6);
    let sink = RtrbSink::new(out);
    let dropped = sink.drop_counter();

    let mut p = stereo();
    let src = p.add_source("src", PassThrough);
    let sink = p.add("sink", sink);
    p.connect(src, sink).unwrap();
    p.start(src).unwrap();

    p.run(src, &[1.0; 4]).unwrap();
    assert_eq!(dropped.load(Ordering::Relaxed), 0);

    // only two slots left
    p.run(src, &[2.0; 4]).unwrap();
    assert_eq!(dropped.load(Ordering::Relaxed), 4);
    assert_eq!(listener.slots(), 4);
}
