//! Out-of-order data frames against the full split client.
//!
//! A scripted device answers the control handshake, then injects three
//! data frames with sequence ids 10, 9, 11. The client must accept 10 and
//! 11, drop 9, and the collector's row count must grow by exactly the two
//! accepted blocks' sample counts.

use std::{
    net::{TcpListener, UdpSocket},
    thread,
    time::{Duration, Instant},
};

use crankline_client::{Collector, Device, SplitClient};
use crankline_core::StreamLink;
use crankline_proto::{
    ControlMessage, DataFrame, Opcode, SampleBlock, SetConfig,
};

/// Minimal scripted device: ack the handshake, stream the given frames,
/// then ack whatever else arrives until the client hangs up.
fn scripted_device(frames: Vec<DataFrame>) -> (u16, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let join = thread::spawn(move || {
        let (stream, peer) = listener.accept().unwrap();
        let mut link = StreamLink::from_stream(stream);

        // SET_CONFIG tells us where to stream.
        let frame = link.read_control().unwrap();
        assert_eq!(frame.opcode(), Some(Opcode::SetConfig));
        let config: SetConfig = serde_json::from_slice(&frame.payload).unwrap();
        let udp_port = config.udp_port.expect("client always sends its port");
        ack(&mut link, b"OK");

        let frame = link.read_control().unwrap();
        assert_eq!(frame.opcode(), Some(Opcode::Start));
        ack(&mut link, b"STREAMING_STARTED");

        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let target = (peer.ip(), udp_port);
        // Let the client's collector start draining before the first
        // frame, so no block is overwritten in the latest-frame cell.
        thread::sleep(Duration::from_millis(150));
        for frame in frames {
            let mut wire = Vec::new();
            frame.encode(&mut wire).unwrap();
            socket.send_to(&wire, target).unwrap();
            thread::sleep(Duration::from_millis(30));
        }

        // STOP from disconnect, or EOF when the client is dropped.
        while let Ok(frame) = link.read_control() {
            if frame.opcode() == Some(Opcode::Stop) {
                ack(&mut link, b"STREAMING_STOPPED");
            }
        }
    });

    (port, join)
}

fn ack(link: &mut StreamLink, payload: &[u8]) {
    let message = ControlMessage::Ack(bytes::Bytes::copy_from_slice(payload));
    link.write_control(&message.into_frame().unwrap()).unwrap();
}

fn block(times: &[f64]) -> SampleBlock {
    let rows: Vec<Vec<f64>> = times.iter().map(|&time| vec![time, 1.0]).collect();
    SampleBlock::from_rows(&rows).unwrap()
}

#[test]
fn reordered_frame_is_dropped_and_rows_grow_by_accepted_blocks() {
    let frames = vec![
        DataFrame { sequence_id: 10, block: block(&[0.00, 0.02]) },
        DataFrame { sequence_id: 9, block: block(&[0.01]) },
        DataFrame { sequence_id: 11, block: block(&[0.04, 0.06, 0.08]) },
    ];
    let (port, join) = scripted_device(frames);

    let mut client = SplitClient::new("127.0.0.1", port, 1);
    assert!(client.connect());

    let collector = Collector::new(client);
    collector.start();

    // spb(10) + spb(11) = 5 rows; frame 9 must never land.
    let deadline = Instant::now() + Duration::from_secs(3);
    while collector.len() < 5 {
        assert!(Instant::now() < deadline, "collector stalled at {} rows", collector.len());
        thread::sleep(Duration::from_millis(10));
    }
    thread::sleep(Duration::from_millis(100));
    assert_eq!(collector.len(), 5);

    let times: Vec<f64> = collector.snapshot(usize::MAX).times().collect();
    assert_eq!(times, vec![0.00, 0.02, 0.04, 0.06, 0.08]);

    collector.shutdown();
    join.join().unwrap();
}
