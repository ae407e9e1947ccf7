//! Integration tests for the pipeline reader surface.
//!
//! Tests verify:
//! - values written by a producer thread arrive through the reader adapters
//!   in order, with the right element transform applied
//! - the uniform `PipelineReader` trait works as a trait object across
//!   stream-backed and buffer-backed adapters
//! - remote-tagged readers attribute items to their origin
//! - external wait loops can race the data-ready handle against a timer

use std::thread;
use std::time::Duration;

use husk_pipeline::{
    ObjectReader, ObjectStream, PipelineReader, RecordReader, RemoteObjectReader, SharedBuffer,
    SharedObjectReader,
};
use husk_types::{Record, Value};
use uuid::Uuid;

#[test]
fn producer_thread_to_record_reader() {
    let stream = ObjectStream::new(4);

    let producer = {
        let stream = stream.clone();
        thread::spawn(move || {
            for n in 0..20 {
                stream.write(Value::Int(n)).unwrap();
            }
            stream.close();
        })
    };

    let mut reader = RecordReader::new(stream);
    let mut seen = Vec::new();
    while let Some(record) = reader.read() {
        seen.push(record);
    }
    producer.join().unwrap();

    let expected: Vec<Record> = (0..20).map(|n| Record::new(Value::Int(n))).collect();
    assert_eq!(seen, expected);
    assert!(reader.end_of_pipeline());
}

#[test]
fn uniform_interface_over_stream_and_buffer_readers() {
    let stream = ObjectStream::new(8);
    stream.write(Value::String("from-stream".into())).unwrap();
    stream.close();

    let buf = SharedBuffer::new();
    buf.push(Value::String("from-buffer".into())).unwrap();
    buf.complete();

    let mut readers: Vec<Box<dyn PipelineReader<Item = Value>>> = vec![
        Box::new(ObjectReader::new(stream)),
        Box::new(SharedObjectReader::new(buf)),
    ];

    let collected: Vec<Value> = readers
        .iter_mut()
        .filter_map(|reader| reader.read())
        .collect();
    assert_eq!(
        collected,
        vec![
            Value::String("from-stream".into()),
            Value::String("from-buffer".into()),
        ]
    );
    for reader in &mut readers {
        assert_eq!(reader.read(), None);
    }
}

#[test]
fn remote_readers_attribute_items_to_their_origin() {
    let make_source = |origin: &str, values: &[i64]| {
        let buf = SharedBuffer::new();
        for &n in values {
            buf.push(Value::Int(n)).unwrap();
        }
        buf.complete();
        RemoteObjectReader::new(buf, origin, Uuid::new_v4())
    };

    let mut sources = vec![
        make_source("east", &[1, 2]),
        make_source("west", &[3]),
    ];

    // A multi-source aggregator drains each reader and tags results with
    // the reader's provenance.
    let mut aggregated = Vec::new();
    for reader in &mut sources {
        for value in reader.try_read_all() {
            aggregated.push((reader.origin().to_string(), value));
        }
    }

    assert_eq!(
        aggregated,
        vec![
            ("east".to_string(), Value::Int(1)),
            ("east".to_string(), Value::Int(2)),
            ("west".to_string(), Value::Int(3)),
        ]
    );

    let ids: Vec<Uuid> = sources.iter().map(|r| r.run_id()).collect();
    assert_ne!(ids[0], ids[1]);
}

#[test]
fn wait_loop_races_data_ready_against_timer() {
    let stream = ObjectStream::new(4);
    let mut reader = ObjectReader::new(stream.clone());
    let handle = reader.data_ready_handle();

    // Nothing written yet: the timer side wins.
    assert!(!handle.wait_timeout(Duration::from_millis(20)));

    let producer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        stream.write(Value::Int(1)).unwrap();
        stream.close();
    });

    // Poll with a bounded wait until the stream becomes ready.
    let mut ready = false;
    for _ in 0..100 {
        if handle.wait_timeout(Duration::from_millis(100)) {
            ready = true;
            break;
        }
    }
    assert!(ready);
    assert_eq!(reader.read(), Some(Value::Int(1)));
    assert_eq!(reader.read(), None);
    producer.join().unwrap();
}

#[test]
fn batch_reads_preserve_order_across_transform() {
    let stream = ObjectStream::new(16);
    for n in 0..6 {
        stream.write(Value::Int(n)).unwrap();
    }
    stream.close();

    let mut reader = RecordReader::new(stream);
    let first = reader.read_up_to(4).unwrap();
    let rest = reader.read_to_end().unwrap();

    assert_eq!(first.len(), 4);
    assert_eq!(rest.len(), 2);
    let values: Vec<Value> = first
        .into_iter()
        .chain(rest)
        .map(Record::into_value)
        .collect();
    let expected: Vec<Value> = (0..6).map(Value::Int).collect();
    assert_eq!(values, expected);
}
