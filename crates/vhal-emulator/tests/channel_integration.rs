//! End-to-end tests over real transports.
//!
//! A gateway runs with a TCP socket channel (and, on Unix, a pipe channel over
//! a socket pair) while the test plays the host tool and the guest console
//! with blocking std streams.

use std::net::TcpStream;
use std::sync::{mpsc, Arc};
use std::time::Duration;

use vhal_core::domain::property::{ids, seat};
use vhal_core::protocol::frame::{read_frame, write_frame};
use vhal_core::{
    decode_message, encode_message, EmulatorMessage, MessageType, PropertyPayload, PropertyValue,
    ResponseStatus, SetValueRequest, StatusCode, AREA_GLOBAL,
};
use vhal_emulator::application::debug_dump::PropertyDumper;
use vhal_emulator::application::hardware_gateway::HardwareGateway;
use vhal_emulator::application::write_policy::WritePolicy;
use vhal_emulator::infrastructure::channel::socket::SocketChannel;
use vhal_emulator::infrastructure::channel::{ChannelSet, TransportChannel};
use vhal_emulator::infrastructure::store::InMemoryPropertyStore;

// ── Helpers ───────────────────────────────────────────────────────────────────

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("runtime")
}

fn exchange<S: std::io::Read + std::io::Write>(stream: &mut S, message: &EmulatorMessage) -> EmulatorMessage {
    write_frame(stream, &encode_message(message).expect("encode")).expect("write");
    receive(stream)
}

fn receive<S: std::io::Read>(stream: &mut S) -> EmulatorMessage {
    let frame = read_frame(stream).expect("read").expect("frame before EOF");
    decode_message(&frame).expect("decode")
}

fn connect(addr: std::net::SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("timeout");
    stream
}

fn write_gear(gateway: &HardwareGateway, request_id: i64, gear: i32) -> StatusCode {
    let (tx, rx) = mpsc::channel();
    gateway
        .set_values(
            vec![SetValueRequest {
                request_id,
                value: PropertyValue::new(ids::GEAR_SELECTION, AREA_GLOBAL, PropertyPayload::Int32(vec![gear])),
            }],
            Box::new(move |results| tx.send(results).unwrap()),
        )
        .expect("set_values");
    rx.recv().expect("callback")[0].status
}

// ── Socket channel ────────────────────────────────────────────────────────────

#[test]
fn test_host_tool_over_tcp_reads_writes_and_receives_broadcasts() {
    // Arrange
    let rt = runtime();
    let store = Arc::new(InMemoryPropertyStore::with_defaults());
    let socket = Arc::new(SocketChannel::new("127.0.0.1:0".parse().unwrap(), rt.handle().clone()));
    let gateway = HardwareGateway::new(
        store.clone(),
        ChannelSet::new(Some(socket.clone() as Arc<dyn TransportChannel>), None),
        WritePolicy::default(),
        Arc::new(PropertyDumper::new(store)),
    )
    .expect("gateway");
    let mut tool = connect(socket.local_addr().expect("bound"));

    // Act: protocol write then read back
    let set = exchange(
        &mut tool,
        &EmulatorMessage::set_property(PropertyValue::new(
            ids::HVAC_FAN_SPEED,
            seat::ROW_1_RIGHT,
            PropertyPayload::Int32(vec![6]),
        )),
    );
    let get = exchange(&mut tool, &EmulatorMessage::get_property(ids::HVAC_FAN_SPEED, seat::ROW_1_RIGHT));

    // Act: HAL client write is pushed to the connected tool
    let status = write_gear(&gateway, 1, 2);
    let pushed = receive(&mut tool);

    // Assert
    assert_eq!(set.status, ResponseStatus::Ok);
    assert_eq!(get.values[0].payload, PropertyPayload::Int32(vec![6]));
    assert_eq!(status, StatusCode::Ok);
    assert_eq!(pushed.message_type, MessageType::SetPropertyAsync);
    assert_eq!(pushed.values[0].prop_id, ids::GEAR_SELECTION);
    assert_eq!(pushed.values[0].payload, PropertyPayload::Int32(vec![2]));

    drop(gateway);
}

#[test]
fn test_every_connected_tool_receives_the_broadcast() {
    let rt = runtime();
    let store = Arc::new(InMemoryPropertyStore::with_defaults());
    let socket = Arc::new(SocketChannel::new("127.0.0.1:0".parse().unwrap(), rt.handle().clone()));
    let gateway = HardwareGateway::new(
        store.clone(),
        ChannelSet::new(Some(socket.clone() as Arc<dyn TransportChannel>), None),
        WritePolicy::default(),
        Arc::new(PropertyDumper::new(store)),
    )
    .expect("gateway");
    let addr = socket.local_addr().expect("bound");
    let mut first = connect(addr);
    let mut second = connect(addr);
    // A completed exchange proves each peer is registered.
    for tool in [&mut first, &mut second] {
        let reply = exchange(tool, &EmulatorMessage::new(MessageType::GetConfigAllCmd));
        assert_eq!(reply.status, ResponseStatus::Ok);
    }

    write_gear(&gateway, 7, 8);

    for tool in [&mut first, &mut second] {
        let pushed = receive(tool);
        assert_eq!(pushed.message_type, MessageType::SetPropertyAsync);
        assert_eq!(pushed.values[0].payload, PropertyPayload::Int32(vec![8]));
    }
    assert_eq!(socket.peer_count(), 2);
}

#[test]
fn test_malformed_frame_is_answered_and_connection_stays_open() {
    let rt = runtime();
    let store = Arc::new(InMemoryPropertyStore::with_defaults());
    let socket = Arc::new(SocketChannel::new("127.0.0.1:0".parse().unwrap(), rt.handle().clone()));
    let _gateway = HardwareGateway::new(
        store.clone(),
        ChannelSet::new(Some(socket.clone() as Arc<dyn TransportChannel>), None),
        WritePolicy::default(),
        Arc::new(PropertyDumper::new(store)),
    )
    .expect("gateway");
    let mut tool = connect(socket.local_addr().expect("bound"));

    write_frame(&mut tool, &[0x09, 0x03]).expect("write");
    let error_reply = receive(&mut tool);
    let next = exchange(&mut tool, &EmulatorMessage::get_config(ids::GEAR_SELECTION));

    assert_eq!(error_reply.status, ResponseStatus::InvalidOperation);
    assert_eq!(next.status, ResponseStatus::Ok);
    assert_eq!(next.configs[0].prop_id, ids::GEAR_SELECTION);
}

// ── Both channels ─────────────────────────────────────────────────────────────

#[cfg(unix)]
#[test]
fn test_guest_console_and_host_tool_both_receive_broadcast() {
    use std::os::unix::net::UnixStream;
    use vhal_emulator::infrastructure::channel::pipe::PipeChannel;

    // Arrange
    let rt = runtime();
    let store = Arc::new(InMemoryPropertyStore::with_defaults());
    let socket = Arc::new(SocketChannel::new("127.0.0.1:0".parse().unwrap(), rt.handle().clone()));
    let (ours, mut console) = UnixStream::pair().expect("pair");
    console
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("timeout");
    let pipe = PipeChannel::from_streams(ours.try_clone().expect("clone"), ours);
    let gateway = HardwareGateway::new(
        store.clone(),
        ChannelSet::new(
            Some(socket.clone() as Arc<dyn TransportChannel>),
            Some(Arc::new(pipe) as Arc<dyn TransportChannel>),
        ),
        WritePolicy::default(),
        Arc::new(PropertyDumper::new(store)),
    )
    .expect("gateway");
    let mut tool = connect(socket.local_addr().expect("bound"));
    exchange(&mut tool, &EmulatorMessage::new(MessageType::GetPropertyAllCmd));

    // Act: the console writes, then the HAL client writes
    let console_reply = exchange(
        &mut console,
        &EmulatorMessage::set_property(PropertyValue::new(
            ids::GEAR_SELECTION,
            AREA_GLOBAL,
            PropertyPayload::Int32(vec![1]),
        )),
    );
    write_gear(&gateway, 3, 4);

    // Assert
    assert_eq!(console_reply.status, ResponseStatus::Ok);
    for pushed in [receive(&mut tool), receive(&mut console)] {
        assert_eq!(pushed.message_type, MessageType::SetPropertyAsync);
        assert_eq!(pushed.values[0].payload, PropertyPayload::Int32(vec![4]));
    }
}

// ── Pipe edge cases ───────────────────────────────────────────────────────────

#[cfg(unix)]
fn pipe_only_gateway() -> (std::sync::Arc<HardwareGateway>, std::os::unix::net::UnixStream) {
    use std::os::unix::net::UnixStream;
    use vhal_emulator::infrastructure::channel::pipe::PipeChannel;

    let store = Arc::new(InMemoryPropertyStore::with_defaults());
    let (ours, console) = UnixStream::pair().expect("pair");
    console
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("timeout");
    let pipe = PipeChannel::from_streams(ours.try_clone().expect("clone"), ours);
    let gateway = HardwareGateway::new(
        store.clone(),
        ChannelSet::new(None, Some(Arc::new(pipe) as Arc<dyn TransportChannel>)),
        WritePolicy::default(),
        Arc::new(PropertyDumper::new(store)),
    )
    .expect("gateway");
    (gateway, console)
}

#[cfg(unix)]
#[test]
fn test_debug_dump_too_large_for_a_frame_still_gets_exactly_one_reply() {
    use vhal_emulator::infrastructure::channel::UNFRAMEABLE_REPLY_STATUS;

    // Arrange: each control character is escaped to six bytes in the dump.
    let (_gateway, mut console) = pipe_only_gateway();
    let make = "\u{1}".repeat(300_000);
    let set = exchange(
        &mut console,
        &EmulatorMessage::set_property(PropertyValue::new(
            ids::INFO_MAKE,
            AREA_GLOBAL,
            PropertyPayload::String(make),
        )),
    );

    // Act
    let dump = exchange(&mut console, &EmulatorMessage::new(MessageType::DebugCmd));
    let next = exchange(&mut console, &EmulatorMessage::get_config(ids::GEAR_SELECTION));

    // Assert
    assert_eq!(set.status, ResponseStatus::Ok);
    assert_eq!(dump.message_type, MessageType::DebugResp);
    assert_eq!(dump.status, UNFRAMEABLE_REPLY_STATUS);
    assert_eq!(next.message_type, MessageType::GetConfigResp);
    assert_eq!(next.configs[0].prop_id, ids::GEAR_SELECTION);
}

#[cfg(unix)]
#[test]
fn test_hal_writes_do_not_block_on_a_console_that_stopped_reading() {
    // Arrange: the console is never read, so its buffer fills.
    let (gateway, _console) = pipe_only_gateway();
    let (done_tx, done_rx) = mpsc::channel();

    // Act
    std::thread::spawn(move || {
        let ok = (0..50_000).all(|i| write_gear(&gateway, i, (i % 8) as i32) == StatusCode::Ok);
        let _ = done_tx.send(ok);
    });

    // Assert
    let all_ok = done_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("set_values blocked on a stalled console");
    assert!(all_ok);
}
