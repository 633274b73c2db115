use std::{sync::Arc, time::Duration};

use bytes::{Bytes, BytesMut};
use mqtt_core::{
    packet::{
        decode_packet, ConnAckPacket, FixedHeader, MqttPacket, PubAckPacket, PubCompPacket,
        PubRecPacket, PublishPacket, SubAckPacket, UnsubAckPacket,
    },
    qos::{QosLevel, SubAckQoS},
    ConnectReturnCode,
};
use mqtt_client::{ClientConfig, ErrorKind, NullLogger, Session};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, DuplexStream},
    sync::Mutex as TokioMutex,
};

/// Hands the client half of a `tokio::io::duplex` pair to `Session::connect`
/// exactly once; a second call fails, since these tests never reconnect.
fn make_connector(stream: DuplexStream) -> mqtt_client::Connector<DuplexStream> {
    let slot = Arc::new(TokioMutex::new(Some(stream)));
    return Arc::new(move || {
        let slot = slot.clone();
        Box::pin(async move {
            slot.lock().await.take().ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::Other, "test transport already consumed")
            })
        }) as std::pin::Pin<Box<dyn std::future::Future<Output = std::io::Result<DuplexStream>> + Send>>
    });
}

/// Reads one framed packet off a raw stream, mirroring the session engine's
/// own framing (read the type byte, the remaining-length varint, then the
/// declared number of body bytes) so the simulated broker can assert on what
/// the client actually put on the wire.
async fn read_raw_packet<S: tokio::io::AsyncRead + Unpin>(stream: &mut S) -> MqttPacket {
    let mut type_byte = [0u8; 1];
    stream.read_exact(&mut type_byte).await.expect("stream closed while reading type byte");

    let mut header = vec![type_byte[0]];
    loop {
        let mut b = [0u8; 1];
        stream.read_exact(&mut b).await.expect("stream closed while reading remaining length");
        header.push(b[0]);
        if b[0] & 0x80 == 0 {
            break;
        }
    }

    let mut probe = Bytes::from(header.clone());
    let f_header = FixedHeader::decode(&mut probe).expect("malformed fixed header");

    let mut rest = vec![0u8; f_header.rest_len()];
    stream.read_exact(&mut rest).await.expect("stream closed while reading packet body");

    let mut full = BytesMut::from(header.as_slice());
    full.extend_from_slice(&rest);
    let mut full = full.freeze();
    let f_header = FixedHeader::decode(&mut full).expect("malformed fixed header");
    return decode_packet(f_header, &mut full).expect("malformed packet body");
}

#[tokio::test]
async fn connect_minimal_handshake() {
    let (client_half, mut broker_half) = tokio::io::duplex(4096);
    let connector = make_connector(client_half);
    let config = ClientConfig::builder("mqtt-haskell", "broker.local", 1883);

    let broker = tokio::spawn(async move {
        let packet = read_raw_packet(&mut broker_half).await;
        let connect = match packet {
            MqttPacket::Connect(p) => p,
            other => panic!("expected CONNECT, got {:?}", other.msg_type()),
        };
        assert_eq!(connect.client_id, "mqtt-haskell");
        assert!(connect.clean_session);
        assert_eq!(connect.keep_alive, 0);

        let connack = ConnAckPacket::new(false, ConnectReturnCode::Accept);
        broker_half.write_all(&connack.encode()).await.unwrap();
        broker_half
    });

    let session = Session::connect(config, connector, Arc::new(NullLogger)).await.unwrap();
    broker.await.unwrap();
    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn connect_rejected_returns_error() {
    let (client_half, mut broker_half) = tokio::io::duplex(4096);
    let connector = make_connector(client_half);
    let config = ClientConfig::builder("rejected-client", "broker.local", 1883);

    let broker = tokio::spawn(async move {
        let _ = read_raw_packet(&mut broker_half).await;
        let connack = ConnAckPacket::new(false, ConnectReturnCode::BadUsernameOrPassword);
        broker_half.write_all(&connack.encode()).await.unwrap();
    });

    let result = Session::connect(config, connector, Arc::new(NullLogger)).await;
    broker.await.unwrap();

    let err = result.expect_err("a non-zero return code must fail connect");
    assert!(matches!(
        err.kind(),
        ErrorKind::ConnectRejected(ConnectReturnCode::BadUsernameOrPassword)
    ));
}

#[tokio::test]
async fn qos1_publish_completes_on_matching_puback() {
    let (client_half, mut broker_half) = tokio::io::duplex(4096);
    let connector = make_connector(client_half);
    let config = ClientConfig::builder("qos1-client", "broker.local", 1883);

    let broker = tokio::spawn(async move {
        let _connect = read_raw_packet(&mut broker_half).await;
        broker_half.write_all(&ConnAckPacket::new(false, ConnectReturnCode::Accept).encode()).await.unwrap();

        let packet = read_raw_packet(&mut broker_half).await;
        let publish = match packet {
            MqttPacket::Publish(p) => p,
            other => panic!("expected PUBLISH, got {:?}", other.msg_type()),
        };
        assert_eq!(publish.topic, "a/b");
        assert_eq!(publish.qos, QosLevel::AtLeastOnce);
        let id = publish.packet_id.expect("QoS 1 PUBLISH must carry a packet id");

        broker_half.write_all(&PubAckPacket::new(id).encode()).await.unwrap();
        broker_half
    });

    let session = Session::connect(config, connector, Arc::new(NullLogger)).await.unwrap();
    session
        .publish(QosLevel::AtLeastOnce, false, "a/b", Bytes::from_static(b"hi"))
        .await
        .unwrap();

    broker.await.unwrap();
    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn qos2_publish_full_handshake() {
    let (client_half, mut broker_half) = tokio::io::duplex(4096);
    let connector = make_connector(client_half);
    let config = ClientConfig::builder("qos2-client", "broker.local", 1883);

    let broker = tokio::spawn(async move {
        let _connect = read_raw_packet(&mut broker_half).await;
        broker_half.write_all(&ConnAckPacket::new(false, ConnectReturnCode::Accept).encode()).await.unwrap();

        let packet = read_raw_packet(&mut broker_half).await;
        let publish = match packet {
            MqttPacket::Publish(p) => p,
            other => panic!("expected PUBLISH, got {:?}", other.msg_type()),
        };
        let id = publish.packet_id.expect("QoS 2 PUBLISH must carry a packet id");
        broker_half.write_all(&PubRecPacket::new(id).encode()).await.unwrap();

        let packet = read_raw_packet(&mut broker_half).await;
        let pubrel = match packet {
            MqttPacket::PubRel(p) => p,
            other => panic!("expected PUBREL, got {:?}", other.msg_type()),
        };
        assert_eq!(pubrel.packet_id, id);
        broker_half.write_all(&PubCompPacket::new(id).encode()).await.unwrap();
        broker_half
    });

    let session = Session::connect(config, connector, Arc::new(NullLogger)).await.unwrap();
    session
        .publish(QosLevel::ExactlyOnce, false, "t", Bytes::from_static(b"x"))
        .await
        .unwrap();

    broker.await.unwrap();
    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn subscribe_grants_qos_and_delivers_matching_publish_only() {
    let (client_half, mut broker_half) = tokio::io::duplex(4096);
    let connector = make_connector(client_half);
    let config = ClientConfig::builder("sub-client", "broker.local", 1883);

    let broker = tokio::spawn(async move {
        let _connect = read_raw_packet(&mut broker_half).await;
        broker_half.write_all(&ConnAckPacket::new(false, ConnectReturnCode::Accept).encode()).await.unwrap();

        let packet = read_raw_packet(&mut broker_half).await;
        let subscribe = match packet {
            MqttPacket::Subscribe(p) => p,
            other => panic!("expected SUBSCRIBE, got {:?}", other.msg_type()),
        };
        let suback = SubAckPacket::new(subscribe.packet_id, vec![SubAckQoS::QOS(QosLevel::AtLeastOnce)]);
        broker_half.write_all(&suback.encode().unwrap()).await.unwrap();

        let matching = PublishPacket::new(
            String::from("sensors/kitchen/temp"),
            Bytes::from_static(&[0x42]),
            QosLevel::AtMostOnce,
            false,
            None,
        );
        broker_half.write_all(&matching.encode().unwrap()).await.unwrap();

        let non_matching = PublishPacket::new(
            String::from("sensors/kitchen/humidity"),
            Bytes::from_static(&[0x01]),
            QosLevel::AtMostOnce,
            false,
            None,
        );
        broker_half.write_all(&non_matching.encode().unwrap()).await.unwrap();
        broker_half
    });

    let session = Session::connect(config, connector, Arc::new(NullLogger)).await.unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<(String, Bytes)>();
    let granted = session
        .subscribe(QosLevel::AtLeastOnce, "sensors/+/temp", move |topic, payload| {
            let _ = tx.send((topic, payload));
        })
        .await
        .unwrap();
    assert_eq!(granted, QosLevel::AtLeastOnce);

    let (topic, payload) = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("callback should fire for the matching publish")
        .expect("channel should not have closed");
    assert_eq!(topic, "sensors/kitchen/temp");
    assert_eq!(payload.as_ref(), &[0x42]);

    let second = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(second.is_err(), "a non-matching topic must not invoke the callback");

    broker.await.unwrap();
    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn unsubscribe_removes_handler_and_stops_delivery() {
    let (client_half, mut broker_half) = tokio::io::duplex(4096);
    let connector = make_connector(client_half);
    let config = ClientConfig::builder("unsub-client", "broker.local", 1883);

    let broker = tokio::spawn(async move {
        let _connect = read_raw_packet(&mut broker_half).await;
        broker_half.write_all(&ConnAckPacket::new(false, ConnectReturnCode::Accept).encode()).await.unwrap();

        let packet = read_raw_packet(&mut broker_half).await;
        let subscribe = match packet {
            MqttPacket::Subscribe(p) => p,
            other => panic!("expected SUBSCRIBE, got {:?}", other.msg_type()),
        };
        let suback = SubAckPacket::new(subscribe.packet_id, vec![SubAckQoS::QOS(QosLevel::AtMostOnce)]);
        broker_half.write_all(&suback.encode().unwrap()).await.unwrap();

        let packet = read_raw_packet(&mut broker_half).await;
        let unsubscribe = match packet {
            MqttPacket::Unsubscribe(p) => p,
            other => panic!("expected UNSUBSCRIBE, got {:?}", other.msg_type()),
        };
        broker_half.write_all(&UnsubAckPacket::new(unsubscribe.packet_id).encode()).await.unwrap();

        // Sent only after the broker has seen UNSUBSCRIBE; a lingering handler would catch it.
        let late = PublishPacket::new(String::from("x/y"), Bytes::from_static(b"late"), QosLevel::AtMostOnce, false, None);
        broker_half.write_all(&late.encode().unwrap()).await.unwrap();
        broker_half
    });

    let session = Session::connect(config, connector, Arc::new(NullLogger)).await.unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<(String, Bytes)>();
    session
        .subscribe(QosLevel::AtMostOnce, "x/y", move |topic, payload| {
            let _ = tx.send((topic, payload));
        })
        .await
        .unwrap();

    session.unsubscribe("x/y").await.unwrap();

    let result = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(result.is_err(), "an unsubscribed handler must not receive further deliveries");

    broker.await.unwrap();
    session.disconnect().await.unwrap();
}
