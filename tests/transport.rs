// Producer-side laws, exercised on the in-process backend so they run anywhere.
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use audioviz_shm::inspect::{inspect_segment, SlotReport};
use audioviz_shm::Core::{AccessMode, FlowCounter, HeapBackend, IpcBackend, SharedSegment};
use audioviz_shm::Transport::FrameStats;
use audioviz_shm::Transport::Frame::Header::{FrameHeader, HEADER_SIZE, MAGIC_NUMBER};
use audioviz_shm::{
    unlink_resources_with, ReadOutcome, TransportBuilder, VizError, WriteOutcome,
};

fn unique(prefix: &str) -> String {
    format!("/{prefix}_{}_{}", std::process::id(), fastrand::u64(..))
}

fn names() -> (String, String) {
    (unique("test_shm"), unique("test_sem"))
}

fn heap_builder_for(segment: &str, counter: &str) -> TransportBuilder {
    TransportBuilder::new()
        .with_backend(Arc::new(HeapBackend))
        .with_segment_name(segment)
        .with_counter_name(counter)
        .with_summary_interval(None)
}

fn heap_builder() -> TransportBuilder {
    let (segment, counter) = names();
    heap_builder_for(&segment, &counter)
}

fn random_bins(n: usize) -> Vec<f32> {
    (0..n).map(|_| fastrand::f32()).collect()
}

#[test]
fn transport_initializes_at_sequence_zero() {
    let transport = heap_builder().build_producer().unwrap();
    assert_eq!(transport.frame_sequence(), 0);
    assert_eq!(transport.pending().unwrap(), 0);
    transport.cleanup().unwrap();
}

#[test]
fn sequential_writes_fill_every_slot() {
    for n in 1..=8u64 {
        let mut transport = heap_builder().build_producer().unwrap();
        for i in 0..n {
            let outcome = transport.write_frame(&random_bins(512), 44_100, None).unwrap();
            assert_eq!(
                outcome,
                WriteOutcome::Written {
                    sequence: i,
                    slot: i as usize
                }
            );
        }
        assert_eq!(transport.frame_sequence(), n);
        assert_eq!(transport.pending().unwrap() as u64, n);
        transport.cleanup().unwrap();
    }
}

#[test]
fn saturated_counter_drops_without_advancing() {
    let mut transport = heap_builder().with_slot_count(4).build_producer().unwrap();
    for _ in 0..4 {
        assert!(transport.write_frame(&random_bins(64), 48_000, None).unwrap().is_written());
    }

    for _ in 0..5 {
        let outcome = transport.write_frame(&random_bins(64), 48_000, None).unwrap();
        assert_eq!(outcome, WriteOutcome::Dropped);
        assert_eq!(transport.frame_sequence(), 4);
    }
    let stats = transport.stats();
    assert_eq!(stats.written, 4);
    assert_eq!(stats.dropped, 5);
    assert_eq!(transport.pending().unwrap(), 4);
    transport.cleanup().unwrap();
}

#[test]
fn scenario_eight_slots_then_drop() {
    let builder = heap_builder()
        .with_slot_count(8)
        .with_slot_size(8192)
        .with_max_bins(512);
    let mut transport = builder.build_producer().unwrap();

    for _ in 0..8 {
        let outcome = transport.write_frame(&random_bins(512), 44_100, None).unwrap();
        assert!(outcome.is_written());
    }
    assert_eq!(transport.frame_sequence(), 8);

    let outcome = transport.write_frame(&random_bins(512), 44_100, None).unwrap();
    assert_eq!(outcome, WriteOutcome::Dropped);
    assert_eq!(transport.frame_sequence(), 8);
    transport.cleanup().unwrap();
}

#[test]
fn oversized_magnitude_is_truncated() {
    let (segment, counter) = names();
    let mut transport = heap_builder_for(&segment, &counter)
        .with_max_bins(512)
        .build_producer()
        .unwrap();

    let magnitude = random_bins(512 + 37);
    let phase = random_bins(512 + 37);
    assert!(transport
        .write_frame(&magnitude, 44_100, Some(&phase))
        .unwrap()
        .is_written());
    assert_eq!(transport.stats().truncated, 1);

    let mut reader = heap_builder_for(&segment, &counter).build_reader(true).unwrap();
    let ReadOutcome::Frame(frame) = reader.try_read().unwrap() else {
        panic!("expected a frame");
    };
    assert_eq!(frame.header.bin_count, 512);
    assert_eq!(frame.magnitude, &magnitude[..512]);
    assert_eq!(frame.phase.as_deref(), Some(&phase[..512]));
    transport.cleanup().unwrap();
}

#[test]
fn frame_too_large_leaves_sequence_unchanged() {
    let mut transport = heap_builder()
        .with_slot_size(1024)
        .with_max_bins(512)
        .build_producer()
        .unwrap();

    let err = transport.write_frame(&random_bins(512), 44_100, None).unwrap_err();
    match err {
        VizError::FrameTooLarge {
            required,
            slot_size,
        } => {
            assert_eq!(required, HEADER_SIZE + 512 * 4);
            assert_eq!(slot_size, 1024);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!transport
        .write_frame(&random_bins(512), 44_100, None)
        .unwrap_err()
        .is_fatal());
    assert_eq!(transport.frame_sequence(), 0);
    assert_eq!(transport.pending().unwrap(), 0);

    // Smaller frames still go through.
    assert!(transport.write_frame(&random_bins(128), 44_100, None).unwrap().is_written());
    assert_eq!(transport.frame_sequence(), 1);
    transport.cleanup().unwrap();
}

#[test]
fn refused_frames_are_not_counted_as_truncated() {
    let mut transport = heap_builder()
        .with_slot_size(1024)
        .with_max_bins(512)
        .build_producer()
        .unwrap();

    let err = transport.write_frame(&random_bins(600), 44_100, None).unwrap_err();
    assert!(matches!(err, VizError::FrameTooLarge { .. }));
    assert_eq!(
        transport.stats(),
        FrameStats {
            written: 0,
            dropped: 0,
            truncated: 0,
            rejected: 1
        }
    );
    transport.cleanup().unwrap();
}

#[test]
fn phase_length_must_match_magnitude() {
    let mut transport = heap_builder().build_producer().unwrap();
    let err = transport
        .write_frame(&random_bins(100), 44_100, Some(&random_bins(99)))
        .unwrap_err();
    assert!(matches!(
        err,
        VizError::PhaseLengthMismatch {
            magnitude: 100,
            phase: 99
        }
    ));
    assert_eq!(transport.frame_sequence(), 0);
    transport.cleanup().unwrap();
}

#[test]
fn frames_land_at_sequence_mod_slot_count() {
    let (segment, counter) = names();
    let mut transport = heap_builder_for(&segment, &counter)
        .with_slot_count(3)
        .with_slot_size(512)
        .with_max_bins(64)
        .build_producer()
        .unwrap();
    let backend = HeapBackend;
    let view = backend.attach_segment(&segment, AccessMode::ReadOnly).unwrap();
    let acks = backend.attach_counter(&counter).unwrap();

    for s in 0..10u64 {
        let outcome = transport.write_frame(&random_bins(16), 44_100, None).unwrap();
        let expected_slot = (s % 3) as usize;
        assert_eq!(
            outcome,
            WriteOutcome::Written {
                sequence: s,
                slot: expected_slot
            }
        );
        assert_eq!(transport.slot_offset(expected_slot), expected_slot * 512);

        let bytes = view.read_at(expected_slot * 512, HEADER_SIZE).unwrap();
        let header = FrameHeader::decode(&bytes, MAGIC_NUMBER).unwrap();
        assert_eq!(header.sequence, s);
        assert_eq!(header.bin_count, 16);

        // Play the consumer: acknowledge the slot.
        assert!(acks.try_wait().unwrap());
    }
    transport.cleanup().unwrap();
}

#[test]
fn slot_is_zero_padded_and_timestamped() {
    let (segment, counter) = names();
    let mut transport = heap_builder_for(&segment, &counter)
        .with_slot_count(2)
        .with_slot_size(256)
        .with_max_bins(16)
        .build_producer()
        .unwrap();

    let before = now_us();
    transport.write_frame(&[1.0, 2.0, 3.0], 22_050, None).unwrap();
    let after = now_us();

    let view = HeapBackend.attach_segment(&segment, AccessMode::ReadOnly).unwrap();
    let slot = view.read_at(0, 256).unwrap();
    let header = FrameHeader::decode(&slot, MAGIC_NUMBER).unwrap();
    assert!(header.timestamp_us >= before && header.timestamp_us <= after);
    assert_eq!(header.sample_rate, 22_050);
    assert_eq!(&slot[HEADER_SIZE..HEADER_SIZE + 4], &1.0f32.to_le_bytes());
    assert!(slot[HEADER_SIZE + 12..].iter().all(|&b| b == 0));
    transport.cleanup().unwrap();
}

#[test]
fn draining_reopens_the_gate() {
    let (segment, counter) = names();
    let mut transport = heap_builder_for(&segment, &counter)
        .with_slot_count(2)
        .build_producer()
        .unwrap();
    let mut reader = heap_builder_for(&segment, &counter)
        .with_slot_count(2)
        .build_reader(false)
        .unwrap();

    assert!(transport.write_frame(&[0.1], 44_100, None).unwrap().is_written());
    assert!(transport.write_frame(&[0.2], 44_100, None).unwrap().is_written());
    assert_eq!(
        transport.write_frame(&[0.3], 44_100, None).unwrap(),
        WriteOutcome::Dropped
    );

    assert!(matches!(reader.try_read().unwrap(), ReadOutcome::Frame(_)));
    assert_eq!(transport.pending().unwrap(), 1);
    assert_eq!(
        transport.write_frame(&[0.4], 44_100, None).unwrap(),
        WriteOutcome::Written { sequence: 2, slot: 0 }
    );
    transport.cleanup().unwrap();
}

#[test]
fn close_keeps_resources_and_cleanup_removes_them() {
    let (segment, counter) = names();
    let mut transport = heap_builder_for(&segment, &counter).build_producer().unwrap();
    transport.write_frame(&[0.5; 8], 44_100, None).unwrap();
    transport.close();

    // Still there for other processes.
    let config = heap_builder_for(&segment, &counter).build_config().unwrap();
    let snapshot = inspect_segment(&HeapBackend, config).unwrap();
    assert_eq!(snapshot.counter_value, Some(1));
    assert!(matches!(snapshot.slots[0], SlotReport::Valid { .. }));

    let report = unlink_resources_with(&HeapBackend, &segment, &counter).unwrap();
    assert!(report.segment_removed && report.counter_removed);
    assert!(matches!(
        HeapBackend.attach_segment(&segment, AccessMode::ReadOnly),
        Err(VizError::NotFound { .. })
    ));
}

#[test]
fn create_replaces_stale_resources() {
    let (segment, counter) = names();
    let mut stale = heap_builder_for(&segment, &counter).build_producer().unwrap();
    for _ in 0..8 {
        stale.write_frame(&[1.0; 32], 44_100, None).unwrap();
    }
    // Simulate a crash: handles released, names left behind.
    stale.close();

    let fresh = heap_builder_for(&segment, &counter).build_producer().unwrap();
    assert_eq!(fresh.pending().unwrap(), 0);
    assert_eq!(fresh.frame_sequence(), 0);

    let view = HeapBackend.attach_segment(&segment, AccessMode::ReadOnly).unwrap();
    assert!(view.read_at(0, HEADER_SIZE).unwrap().iter().all(|&b| b == 0));
    fresh.cleanup().unwrap();
}

#[test]
fn invalid_geometry_is_rejected() {
    let err = heap_builder().with_slot_count(0).build_producer().unwrap_err();
    assert!(matches!(err, VizError::InvalidConfig { parameter: "slot_count", .. }));

    let err = heap_builder().with_slot_size(HEADER_SIZE - 1).build_producer().unwrap_err();
    assert!(matches!(err, VizError::InvalidConfig { parameter: "slot_size", .. }));

    let err = heap_builder().with_max_bins(0).build_producer().unwrap_err();
    assert!(matches!(err, VizError::InvalidConfig { parameter: "max_bins", .. }));

    let err = heap_builder().with_segment_name("/a/b").build_producer().unwrap_err();
    assert!(matches!(err, VizError::InvalidName { .. }));
}

#[test]
fn default_config_matches_renderer() {
    let config = TransportBuilder::new().build_config().unwrap();
    assert_eq!(config.segment_name(), "/audioviz_shm");
    assert_eq!(config.counter_name(), "/audioviz_sem_write");
    assert_eq!(config.slot_count(), 8);
    assert_eq!(config.slot_size(), 8192);
    assert_eq!(config.max_bins(), 512);
    assert_eq!(config.magic(), 0x56495A46);
}

/// Heap backend whose counters can never be created.
#[derive(Debug)]
struct NoCounterBackend;

impl IpcBackend for NoCounterBackend {
    fn create_segment(&self, name: &str, size: usize) -> audioviz_shm::Result<Box<dyn SharedSegment>> {
        HeapBackend.create_segment(name, size)
    }

    fn attach_segment(&self, name: &str, access: AccessMode) -> audioviz_shm::Result<Box<dyn SharedSegment>> {
        HeapBackend.attach_segment(name, access)
    }

    fn unlink_segment(&self, name: &str) -> audioviz_shm::Result<bool> {
        HeapBackend.unlink_segment(name)
    }

    fn create_counter(&self, _name: &str) -> audioviz_shm::Result<Box<dyn FlowCounter>> {
        Err(VizError::Unsupported("counters disabled"))
    }

    fn attach_counter(&self, name: &str) -> audioviz_shm::Result<Box<dyn FlowCounter>> {
        HeapBackend.attach_counter(name)
    }

    fn unlink_counter(&self, name: &str) -> audioviz_shm::Result<bool> {
        HeapBackend.unlink_counter(name)
    }
}

#[test]
fn counter_failure_removes_new_segment() {
    let (segment, counter) = names();
    let err = TransportBuilder::new()
        .with_backend(Arc::new(NoCounterBackend))
        .with_segment_name(&segment)
        .with_counter_name(&counter)
        .build_producer()
        .unwrap_err();
    assert!(matches!(err, VizError::Unsupported(_)));
    assert!(err.is_fatal());
    assert!(matches!(
        HeapBackend.attach_segment(&segment, AccessMode::ReadOnly),
        Err(VizError::NotFound { .. })
    ));
}

fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_micros() as u64
}
