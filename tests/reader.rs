// Consumer side: ordered reads, acknowledgement, gaps and damaged slots.
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use audioviz_shm::inspect::SlotReport;
use audioviz_shm::Core::{AccessMode, HeapBackend, IpcBackend};
use audioviz_shm::Transport::Frame::Header::{FrameHeader, HEADER_SIZE, MAGIC_NUMBER};
use audioviz_shm::{ReadOutcome, TransportBuilder, VizError, WriteOutcome};

fn names() -> (String, String) {
    (
        format!("/reader_shm_{}_{}", std::process::id(), fastrand::u64(..)),
        format!("/reader_sem_{}_{}", std::process::id(), fastrand::u64(..)),
    )
}

fn heap(segment: &str, counter: &str) -> TransportBuilder {
    TransportBuilder::new()
        .with_backend(Arc::new(HeapBackend))
        .with_segment_name(segment)
        .with_counter_name(counter)
        .with_summary_interval(None)
}

fn expect_frame(outcome: ReadOutcome) -> audioviz_shm::Transport::Frame::Frame {
    match outcome {
        ReadOutcome::Frame(frame) => frame,
        other => panic!("expected a frame, got {other:?}"),
    }
}

#[test]
fn reads_frames_in_order_and_acknowledges() {
    let (segment, counter) = names();
    let mut producer = heap(&segment, &counter).build_producer().unwrap();
    let mut reader = heap(&segment, &counter).build_reader(false).unwrap();

    for i in 0..5 {
        producer.write_frame(&[i as f32; 10], 44_100, None).unwrap();
    }
    assert_eq!(producer.pending().unwrap(), 5);

    for i in 0..5u64 {
        let frame = expect_frame(reader.try_read().unwrap());
        assert_eq!(frame.header.sequence, i);
        assert_eq!(frame.header.magic, MAGIC_NUMBER);
        assert_eq!(frame.header.bin_count, 10);
        assert_eq!(frame.magnitude, vec![i as f32; 10]);
        assert!(frame.phase.is_none());
    }
    assert_eq!(reader.try_read().unwrap(), ReadOutcome::Empty);
    assert_eq!(producer.pending().unwrap(), 0);
    assert_eq!(reader.frames_read(), 5);
    assert_eq!(reader.frames_skipped(), 0);
    assert_eq!(reader.next_sequence(), 5);
    producer.cleanup().unwrap();
}

#[test]
fn phase_follows_magnitude() {
    let (segment, counter) = names();
    let mut producer = heap(&segment, &counter).build_producer().unwrap();
    let mut reader = heap(&segment, &counter).build_reader(true).unwrap();

    let magnitude = [0.25f32, 0.5, 0.75];
    let phase = [-1.0f32, 0.0, 1.0];
    producer.write_frame(&magnitude, 48_000, Some(&phase)).unwrap();

    let frame = expect_frame(reader.try_read().unwrap());
    assert_eq!(frame.header.sample_rate, 48_000);
    assert_eq!(frame.magnitude, magnitude);
    assert_eq!(frame.phase, Some(phase.to_vec()));
    producer.cleanup().unwrap();
}

#[test]
fn empty_after_timeout() {
    let (segment, counter) = names();
    let producer = heap(&segment, &counter).build_producer().unwrap();
    let mut reader = heap(&segment, &counter).build_reader(false).unwrap();

    let outcome = reader.read_next(Some(Duration::from_millis(20))).unwrap();
    assert_eq!(outcome, ReadOutcome::Empty);
    assert_eq!(reader.frames_read(), 0);
    producer.cleanup().unwrap();
}

#[test]
fn blocking_read_wakes_on_signal() {
    let (segment, counter) = names();
    let mut producer = heap(&segment, &counter).build_producer().unwrap();
    let mut reader = heap(&segment, &counter).build_reader(false).unwrap();

    let writer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        let outcome = producer.write_frame(&[1.0; 4], 44_100, None).unwrap();
        assert!(outcome.is_written());
        producer
    });

    let frame = expect_frame(reader.read_next(Some(Duration::from_secs(5))).unwrap());
    assert_eq!(frame.header.sequence, 0);
    writer.join().unwrap().cleanup().unwrap();
}

#[test]
fn overwritten_slots_are_counted_as_skipped() {
    let (segment, counter) = names();
    let mut producer = heap(&segment, &counter)
        .with_slot_count(2)
        .build_producer()
        .unwrap();
    let mut reader = heap(&segment, &counter)
        .with_slot_count(2)
        .build_reader(false)
        .unwrap();

    producer.write_frame(&[0.0], 44_100, None).unwrap();
    producer.write_frame(&[1.0], 44_100, None).unwrap();

    // Another consumer acknowledges both without reading them.
    let thief = HeapBackend.attach_counter(&counter).unwrap();
    assert!(thief.try_wait().unwrap());
    assert!(thief.try_wait().unwrap());

    assert_eq!(
        producer.write_frame(&[2.0], 44_100, None).unwrap(),
        WriteOutcome::Written { sequence: 2, slot: 0 }
    );
    producer.write_frame(&[3.0], 44_100, None).unwrap();

    let frame = expect_frame(reader.try_read().unwrap());
    assert_eq!(frame.header.sequence, 2);
    assert_eq!(reader.frames_skipped(), 2);

    let frame = expect_frame(reader.try_read().unwrap());
    assert_eq!(frame.header.sequence, 3);
    assert_eq!(frame.magnitude, vec![3.0]);
    assert_eq!(reader.frames_skipped(), 2);
    producer.cleanup().unwrap();
}

#[test]
fn damaged_slot_is_reported_and_skipped() {
    let (segment, counter) = names();
    let backend = HeapBackend;
    let config = heap(&segment, &counter).build_config().unwrap();
    let mut raw = backend
        .create_segment(&segment, config.layout().total_size())
        .unwrap();
    let signal = backend.create_counter(&counter).unwrap();

    raw.write_at(0, &[0xAB; HEADER_SIZE]).unwrap();
    signal.signal().unwrap();

    // Valid magic, but more bins than the reader accepts.
    let oversized = FrameHeader {
        magic: MAGIC_NUMBER,
        sequence: 1,
        timestamp_us: 0,
        sample_rate: 44_100,
        bin_count: 100_000,
    };
    raw.write_at(config.slot_size(), &oversized.encode()).unwrap();
    signal.signal().unwrap();

    let mut reader = heap(&segment, &counter).build_reader(false).unwrap();
    match reader.try_read().unwrap() {
        ReadOutcome::Invalid { slot, .. } => assert_eq!(slot, 0),
        other => panic!("expected invalid slot, got {other:?}"),
    }
    match reader.try_read().unwrap() {
        ReadOutcome::Invalid { slot, reason } => {
            assert_eq!(slot, 1);
            assert!(reason.contains("bin count"), "{reason}");
        }
        other => panic!("expected invalid slot, got {other:?}"),
    }
    assert_eq!(reader.frames_invalid(), 2);
    assert_eq!(reader.next_sequence(), 2);
    assert_eq!(signal.value().unwrap(), 0);

    backend.unlink_segment(&segment).unwrap();
    backend.unlink_counter(&counter).unwrap();
}

#[test]
fn exhausted_sequence_number_is_skipped() {
    let (segment, counter) = names();
    let backend = HeapBackend;
    let config = heap(&segment, &counter).build_config().unwrap();
    let mut raw = backend
        .create_segment(&segment, config.layout().total_size())
        .unwrap();
    let signal = backend.create_counter(&counter).unwrap();

    let runaway = FrameHeader {
        magic: MAGIC_NUMBER,
        sequence: u64::MAX,
        timestamp_us: 0,
        sample_rate: 44_100,
        bin_count: 1,
    };
    raw.write_at(0, &runaway.encode()).unwrap();
    signal.signal().unwrap();

    let next = FrameHeader {
        sequence: 1,
        ..runaway
    };
    raw.write_at(config.slot_size(), &next.encode()).unwrap();
    signal.signal().unwrap();

    let mut reader = heap(&segment, &counter).build_reader(false).unwrap();
    match reader.try_read().unwrap() {
        ReadOutcome::Invalid { slot, reason } => {
            assert_eq!(slot, 0);
            assert!(reason.contains("sequence"), "{reason}");
        }
        other => panic!("expected invalid slot, got {other:?}"),
    }
    let frame = expect_frame(reader.try_read().unwrap());
    assert_eq!(frame.header.sequence, 1);
    assert_eq!(reader.next_sequence(), 2);
    assert_eq!(reader.frames_invalid(), 1);

    backend.unlink_segment(&segment).unwrap();
    backend.unlink_counter(&counter).unwrap();
}

#[test]
fn unbounded_timeout_waits_for_signal() {
    let (segment, counter) = names();
    let mut producer = heap(&segment, &counter).build_producer().unwrap();
    let mut reader = heap(&segment, &counter).build_reader(false).unwrap();

    let writer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        producer.write_frame(&[0.5; 2], 44_100, None).unwrap();
        producer
    });

    let start = Instant::now();
    let frame = expect_frame(reader.read_next(Some(Duration::MAX)).unwrap());
    assert_eq!(frame.header.sequence, 0);
    assert!(start.elapsed() >= Duration::from_millis(40));
    writer.join().unwrap().cleanup().unwrap();
}

#[test]
fn reader_requires_existing_resources() {
    let (segment, counter) = names();
    let err = heap(&segment, &counter).build_reader(false).unwrap_err();
    assert!(matches!(err, VizError::NotFound { .. }));
}

#[test]
fn reader_rejects_segment_smaller_than_geometry() {
    let (segment, counter) = names();
    let producer = heap(&segment, &counter)
        .with_slot_count(2)
        .build_producer()
        .unwrap();
    let err = heap(&segment, &counter)
        .with_slot_count(8)
        .build_reader(false)
        .unwrap_err();
    assert!(matches!(err, VizError::InvalidConfig { .. }));
    producer.cleanup().unwrap();
}

#[test]
fn read_only_views_refuse_writes() {
    let (segment, counter) = names();
    let producer = heap(&segment, &counter).build_producer().unwrap();

    let mut view = HeapBackend
        .attach_segment(&segment, AccessMode::ReadOnly)
        .unwrap();
    assert_eq!(view.access(), AccessMode::ReadOnly);
    assert!(matches!(
        view.write_at(0, &[1, 2, 3]),
        Err(VizError::ReadOnly { .. })
    ));

    let size = view.size();
    assert!(matches!(
        view.read_at(size - 2, 4),
        Err(VizError::OutOfBounds { .. })
    ));
    producer.cleanup().unwrap();
}

#[test]
fn inspector_classifies_slots() {
    let (segment, counter) = names();
    let mut producer = heap(&segment, &counter)
        .with_slot_count(4)
        .build_producer()
        .unwrap();
    producer
        .write_frame(&[0.5, 0.25, 0.125, 1.0, 2.0, 3.0, 4.0], 44_100, None)
        .unwrap();
    producer.write_frame(&[9.0, 8.0], 22_050, None).unwrap();

    let mut writer = HeapBackend
        .attach_segment(&segment, AccessMode::ReadWrite)
        .unwrap();
    writer
        .write_at(producer.slot_offset(3), &0xDEAD_BEEFu32.to_le_bytes())
        .unwrap();

    let inspector = heap(&segment, &counter)
        .with_slot_count(4)
        .build_inspector()
        .unwrap();
    let snapshot = inspector.snapshot().unwrap();

    assert_eq!(snapshot.counter_value, Some(2));
    assert_eq!(snapshot.slots.len(), 4);
    assert_eq!(snapshot.valid_slots(), 2);
    match &snapshot.slots[0] {
        SlotReport::Valid {
            header,
            leading_bins,
        } => {
            assert_eq!(header.sequence, 0);
            assert_eq!(header.bin_count, 7);
            assert_eq!(leading_bins, &vec![0.5, 0.25, 0.125, 1.0, 2.0]);
        }
        other => panic!("unexpected slot report {other:?}"),
    }
    match &snapshot.slots[1] {
        SlotReport::Valid { leading_bins, .. } => assert_eq!(leading_bins, &vec![9.0, 8.0]),
        other => panic!("unexpected slot report {other:?}"),
    }
    assert_eq!(snapshot.slots[2], SlotReport::Empty);
    assert_eq!(
        snapshot.slots[3],
        SlotReport::InvalidMagic { found: 0xDEAD_BEEF }
    );

    // Inspection never acknowledges anything.
    assert_eq!(producer.pending().unwrap(), 2);

    let text = snapshot.to_string();
    assert!(text.contains("Slot 2: [EMPTY]"));
    assert!(text.contains("[INVALID MAGIC: 0xDEADBEEF]"));
    assert!(text.contains("Unread slots: 2"));
    assert!(format!("{inspector:?}").starts_with("Inspector"));
    producer.cleanup().unwrap();
}

#[test]
fn inspector_tolerates_missing_counter() {
    let (segment, counter) = names();
    let producer = heap(&segment, &counter).build_producer().unwrap();
    HeapBackend.unlink_counter(&counter).unwrap();

    let snapshot = heap(&segment, &counter)
        .build_inspector()
        .unwrap()
        .snapshot()
        .unwrap();
    assert_eq!(snapshot.counter_value, None);
    assert!(snapshot.slots.iter().all(|s| *s == SlotReport::Empty));
    assert!(snapshot.to_string().contains("counter missing"));

    let report = producer.cleanup().unwrap();
    assert!(report.segment_removed);
    assert!(!report.counter_removed);
}

#[test]
fn debug_output_names_resources() {
    let (segment, counter) = names();
    let producer = heap(&segment, &counter).build_producer().unwrap();
    let reader = heap(&segment, &counter).build_reader(false).unwrap();

    let text = format!("{producer:?}");
    assert!(text.contains("SharedMemoryTransport"));
    assert!(text.contains(&segment));
    assert!(format!("{reader:?}").contains("next_sequence"));
    producer.cleanup().unwrap();
}
