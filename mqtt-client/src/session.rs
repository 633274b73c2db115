use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use bytes::Bytes;
use mqtt_core::{
    err::client::ErrorKind,
    id::IdGenerator,
    packet::{
        decode_packet, ConnAckPacket, ConnectPacket, DisconnectPacket, FixedHeader, MqttPacket,
        PacketType, PingReqPacket, PubAckPacket, PubCompPacket, PubRecPacket, PubRelPacket,
        PublishPacket, SubAckPacket, SubscribePacket, UnsubscribePacket, Will,
    },
    qos::{QosLevel, SubAckQoS},
    topic::{TopicFilter, TopicName, TopicSubscription},
    ConnectReturnCode,
};
use tokio::{
    io::{split, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf},
    sync::{Mutex as TokioMutex, Notify},
    task::JoinHandle,
};

use crate::{
    config::ClientConfig,
    dispatcher::{BoxFuture, Callback, Dispatcher, HandlerId},
    error::ClientError,
    logger::Logger,
};

/// An async factory that opens a new transport. Invoked once by `connect`
/// and again for every reconnect attempt.
pub type Connector<S> = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = std::io::Result<S>> + Send>> + Send + Sync>;

pub type ReconnectCallback = Arc<dyn Fn() + Send + Sync>;

struct TopicHandlerEntry {
    filter: TopicFilter,
    qos: QosLevel,
    callback: Arc<dyn Fn(String, Bytes) + Send + Sync>,
}

struct Shared<S: AsyncRead + AsyncWrite + Unpin + Send + 'static> {
    writer: TokioMutex<Option<WriteHalf<S>>>,
    refilled: Notify,
    send_idle: Notify,
    dispatcher: Dispatcher,
    topic_handlers: StdMutex<Vec<TopicHandlerEntry>>,
    id_gen: StdMutex<IdGenerator>,
    config: ClientConfig,
    logger: Arc<dyn Logger>,
    connector: Connector<S>,
    reconnect_period: StdMutex<Option<u64>>,
    reconnect_cb: StdMutex<Option<ReconnectCallback>>,
}

/// A live MQTT session: the owned transport, the dispatcher and handler
/// tables, and the receive/keep-alive task handles backing it.
pub struct Session<S: AsyncRead + AsyncWrite + Unpin + Send + 'static> {
    shared: Arc<Shared<S>>,
    receive_task: JoinHandle<()>,
    keep_alive_task: Option<JoinHandle<()>>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Opens the transport via `connector`, performs the CONNECT/CONNACK
    /// handshake, and on success spawns the receive and keep-alive tasks.
    /// Returns an error (rather than a null session) on rejection or timeout.
    pub async fn connect(
        config: ClientConfig,
        connector: Connector<S>,
        logger: Arc<dyn Logger>,
    ) -> Result<Self, ClientError> {
        let stream = connector().await?;
        let (mut read_half, mut write_half) = split(stream);

        let connect_packet = build_connect_packet(&config);
        write_half.write_all(&connect_packet.encode()?).await?;
        logger.info(&format!("sent CONNECT for client_id={}", config.client_id()));

        let connack = await_connack(&mut read_half, config.connect_timeout()).await?;

        if connack.return_code != ConnectReturnCode::Accept {
            let _ = write_half.shutdown().await;
            logger.warning(&format!("broker rejected CONNECT: {}", connack.return_code));
            return Err(ClientError::new(
                ErrorKind::ConnectRejected(connack.return_code),
                String::new(),
            ));
        }
        logger.info("CONNACK accepted, session established");

        let reconnect_period = config.reconnect_period();
        let keep_alive = config.keep_alive();

        let shared = Arc::new(Shared {
            writer: TokioMutex::new(Some(write_half)),
            refilled: Notify::new(),
            send_idle: Notify::new(),
            dispatcher: Dispatcher::new(),
            topic_handlers: StdMutex::new(Vec::new()),
            id_gen: StdMutex::new(IdGenerator::new()),
            config,
            logger,
            connector,
            reconnect_period: StdMutex::new(reconnect_period),
            reconnect_cb: StdMutex::new(None),
        });

        install_publish_handler(&shared);

        let keep_alive_task = keep_alive
            .filter(|secs| *secs > 0)
            .map(|secs| tokio::spawn(keep_alive_loop(secs, shared.clone())));

        let receive_task = tokio::spawn(receive_loop(read_half, shared.clone()));

        return Ok(Self {
            shared,
            receive_task,
            keep_alive_task,
        });
    }

    pub async fn publish(
        &self,
        qos: QosLevel,
        retain: bool,
        topic: &str,
        payload: impl Into<Bytes>,
    ) -> Result<(), ClientError> {
        let payload = payload.into();

        match qos {
            QosLevel::AtMostOnce => {
                let packet = PublishPacket::new(topic.to_string(), payload, qos, retain, None);
                self.send_bytes(packet.encode()?).await?;
            }
            QosLevel::AtLeastOnce => {
                let packet_id = self.next_id()?;
                // The id must be freed on every exit path, success or error,
                // so a dropped connection mid-handshake doesn't leak it.
                let result: Result<(), ClientError> = async {
                    let packet = PublishPacket::new(topic.to_string(), payload, qos, retain, Some(packet_id));
                    self.send_bytes(packet.encode()?).await?;
                    self.shared.dispatcher.await_msg(PacketType::PUBACK, Some(packet_id)).await?;
                    return Ok(());
                }
                .await;
                self.free_id(packet_id);
                result?;
            }
            QosLevel::ExactlyOnce => {
                let packet_id = self.next_id()?;
                let result: Result<(), ClientError> = async {
                    let packet = PublishPacket::new(topic.to_string(), payload, qos, retain, Some(packet_id));
                    self.send_bytes(packet.encode()?).await?;
                    self.shared.dispatcher.await_msg(PacketType::PUBREC, Some(packet_id)).await?;

                    let pubrel = PubRelPacket::new(packet_id);
                    self.send_bytes(pubrel.encode()).await?;
                    self.shared.dispatcher.await_msg(PacketType::PUBCOMP, Some(packet_id)).await?;
                    return Ok(());
                }
                .await;
                self.free_id(packet_id);
                result?;
            }
        }

        return Ok(());
    }

    pub async fn subscribe<F>(&self, qos: QosLevel, filter: &str, callback: F) -> Result<QosLevel, ClientError>
    where
        F: Fn(String, Bytes) + Send + Sync + 'static,
    {
        let topic_filter = TopicFilter::from_str(filter)?;
        let packet_id = self.next_id()?;
        let result: Result<QosLevel, ClientError> = async {
            let packet = SubscribePacket::new(packet_id, vec![TopicSubscription::new(topic_filter.clone(), qos)]);
            self.send_bytes(packet.encode()?).await?;
            let response = self.shared.dispatcher.await_msg(PacketType::SUBACK, Some(packet_id)).await?;
            return granted_qos_of(response);
        }
        .await;
        self.free_id(packet_id);
        let granted_qos = result?;

        let mut handlers = self.shared.topic_handlers.lock().unwrap();
        handlers.push(TopicHandlerEntry {
            filter: topic_filter,
            qos: granted_qos,
            callback: Arc::new(callback),
        });

        return Ok(granted_qos);
    }

    /// Removes every handler whose filter equals `filter` exactly, then asks
    /// the broker to drop the subscription.
    pub async fn unsubscribe(&self, filter: &str) -> Result<(), ClientError> {
        let topic_filter = TopicFilter::from_str(filter)?;

        {
            let mut handlers = self.shared.topic_handlers.lock().unwrap();
            handlers.retain(|entry| entry.filter != topic_filter);
        }

        let packet_id = self.next_id()?;
        let result: Result<(), ClientError> = async {
            let packet = UnsubscribePacket::new(packet_id, vec![topic_filter]);
            self.send_bytes(packet.encode()?).await?;
            self.shared.dispatcher.await_msg(PacketType::UNSUBACK, Some(packet_id)).await?;
            return Ok(());
        }
        .await;
        self.free_id(packet_id);
        result?;

        return Ok(());
    }

    /// Re-issues SUBSCRIBE for every persisted handler at its previously
    /// granted QoS, updating the stored grant with the broker's fresh answer.
    pub async fn resubscribe(&self) -> Result<Vec<QosLevel>, ClientError> {
        let entries: Vec<(TopicFilter, QosLevel)> = {
            let handlers = self.shared.topic_handlers.lock().unwrap();
            handlers.iter().map(|entry| (entry.filter.clone(), entry.qos)).collect()
        };

        let mut granted = Vec::with_capacity(entries.len());

        for (filter, qos) in entries {
            let packet_id = self.next_id()?;
            let result: Result<QosLevel, ClientError> = async {
                let packet = SubscribePacket::new(packet_id, vec![TopicSubscription::new(filter.clone(), qos)]);
                self.send_bytes(packet.encode()?).await?;
                let response = self.shared.dispatcher.await_msg(PacketType::SUBACK, Some(packet_id)).await?;
                return granted_qos_of(response);
            }
            .await;
            self.free_id(packet_id);

            let new_qos = result?;

            let mut handlers = self.shared.topic_handlers.lock().unwrap();
            if let Some(entry) = handlers.iter_mut().find(|entry| entry.filter == filter) {
                entry.qos = new_qos;
            }
            drop(handlers);

            granted.push(new_qos);
        }

        return Ok(granted);
    }

    /// Sets (or replaces) the callback fired once per successful reconnect.
    pub fn on_reconnect<F: Fn() + Send + Sync + 'static>(&self, callback: F) {
        *self.shared.reconnect_cb.lock().unwrap() = Some(Arc::new(callback));
    }

    /// Enables (or changes the delay of) automatic reconnect.
    pub fn reconnect(&self, period_secs: u64) {
        *self.shared.reconnect_period.lock().unwrap() = Some(period_secs);
    }

    pub async fn send(&self, packet: &MqttPacket) -> Result<(), ClientError> {
        return self.send_bytes(packet.encode()?).await;
    }

    pub fn add_handler(&self, msg_type: PacketType, callback: Callback) -> HandlerId {
        return self.shared.dispatcher.add_handler(msg_type, callback);
    }

    pub fn remove_handler(&self, msg_type: PacketType, id: HandlerId) {
        self.shared.dispatcher.remove_handler(msg_type, id);
    }

    pub async fn await_msg(&self, msg_type: PacketType, packet_id: Option<u16>) -> Result<MqttPacket, ClientError> {
        return self.shared.dispatcher.await_msg(msg_type, packet_id).await;
    }

    /// Kills the receive and keep-alive tasks, writes DISCONNECT, and closes
    /// the transport. Consuming `self` makes a second call impossible.
    pub async fn disconnect(self) -> Result<(), ClientError> {
        self.receive_task.abort();
        if let Some(task) = &self.keep_alive_task {
            task.abort();
        }

        let mut writer = self.shared.writer.lock().await;
        if let Some(mut write_half) = writer.take() {
            let _ = write_half.write_all(&DisconnectPacket.encode()).await;
            let _ = write_half.shutdown().await;
        }

        return Ok(());
    }

    fn next_id(&self) -> Result<u16, ClientError> {
        return self.shared.id_gen.lock().unwrap().next_id().ok_or_else(|| {
            ClientError::new(
                ErrorKind::ProtocolViolation,
                String::from("no packet ids available, too many operations in flight"),
            )
        });
    }

    fn free_id(&self, id: u16) {
        self.shared.id_gen.lock().unwrap().free_id(id);
    }

    async fn send_bytes(&self, bytes: Bytes) -> Result<(), ClientError> {
        send_locked(&self.shared.writer, &self.shared.refilled, &bytes).await?;
        self.shared.send_idle.notify_one();
        return Ok(());
    }
}

fn granted_qos_of(response: MqttPacket) -> Result<QosLevel, ClientError> {
    let suback: SubAckPacket = match response {
        MqttPacket::SubAck(p) => p,
        other => {
            return Err(ClientError::new(
                ErrorKind::ProtocolViolation,
                format!("expected SUBACK, dispatcher delivered {:?}", other.msg_type()),
            ))
        }
    };

    return match suback.return_codes.first() {
        Some(SubAckQoS::QOS(qos)) => Ok(*qos),
        Some(SubAckQoS::Err) => Err(ClientError::new(
            ErrorKind::ProtocolViolation,
            String::from("broker rejected the subscription"),
        )),
        None => Err(ClientError::new(
            ErrorKind::ProtocolViolation,
            String::from("SUBACK carried no return codes"),
        )),
    };
}

fn build_connect_packet(config: &ClientConfig) -> ConnectPacket {
    let mut packet = ConnectPacket::new(
        config.client_id().to_string(),
        config.clean_session(),
        config.keep_alive().unwrap_or(0),
    );

    if let Some(will) = config.will() {
        let qos = will.qos().unwrap_or(QosLevel::AtMostOnce);
        packet = packet.with_will(Will {
            topic: will.topic.clone(),
            message: Bytes::from(will.message.clone().into_bytes()),
            qos,
            retain: will.retain,
        });
    }

    if let Some(username) = config.username() {
        packet = packet.with_credentials(username.to_string(), config.password());
    }

    return packet;
}

async fn await_connack<R: AsyncRead + Unpin>(
    reader: &mut R,
    connect_timeout: Option<u64>,
) -> Result<ConnAckPacket, ClientError> {
    let packet = match connect_timeout {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), read_packet(reader))
            .await
            .map_err(|_| ClientError::new(ErrorKind::ConnectTimeout, String::new()))??,
        None => read_packet(reader).await?,
    };

    return match packet {
        MqttPacket::ConnAck(connack) => Ok(connack),
        other => Err(ClientError::new(
            ErrorKind::ProtocolViolation,
            format!("expected CONNACK, got {:?}", other.msg_type()),
        )),
    };
}

/// Reads one framed packet: the fixed header byte, the remaining-length
/// varint (one byte at a time until the continuation bit clears), then
/// exactly that many bytes. A short read at any point surfaces as EOF.
async fn read_packet<R: AsyncRead + Unpin>(reader: &mut R) -> Result<MqttPacket, ClientError> {
    let mut header_bytes = Vec::with_capacity(5);

    let mut type_byte = [0u8; 1];
    read_exact_or_eof(reader, &mut type_byte).await?;
    header_bytes.push(type_byte[0]);

    loop {
        let mut b = [0u8; 1];
        read_exact_or_eof(reader, &mut b).await?;
        header_bytes.push(b[0]);

        if b[0] & 0x80 == 0 {
            break;
        }
        if header_bytes.len() > 5 {
            return Err(ClientError::new(
                ErrorKind::ProtocolViolation,
                String::from("remaining-length field exceeded 4 bytes"),
            ));
        }
    }

    let mut frame = bytes::BytesMut::from(header_bytes.as_slice());
    let mut probe = frame.clone().freeze();
    let f_header = FixedHeader::decode(&mut probe)?;

    let mut rest = vec![0u8; f_header.rest_len()];
    read_exact_or_eof(reader, &mut rest).await?;
    frame.extend_from_slice(&rest);

    let mut full = frame.freeze();
    let f_header = FixedHeader::decode(&mut full)?;
    return Ok(decode_packet(f_header, &mut full)?);
}

async fn read_exact_or_eof<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> Result<(), ClientError> {
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(ClientError::new(ErrorKind::Eof, String::new()))
        }
        Err(err) => Err(err.into()),
    }
}

async fn send_locked<S>(
    writer: &TokioMutex<Option<WriteHalf<S>>>,
    refilled: &Notify,
    bytes: &[u8],
) -> Result<(), ClientError>
where
    S: AsyncWrite + Unpin,
{
    loop {
        // Register interest before checking the slot: if reconnect refills
        // it and calls `notify_waiters` between our check and the await
        // below, this registered `Notified` still catches it.
        let notified = refilled.notified();

        let mut guard = writer.lock().await;
        if let Some(write_half) = guard.as_mut() {
            write_half.write_all(bytes).await?;
            return Ok(());
        }
        drop(guard);
        notified.await;
    }
}

fn install_publish_handler<S>(shared: &Arc<Shared<S>>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let handler_shared = shared.clone();
    shared.dispatcher.add_handler(
        PacketType::PUBLISH,
        Arc::new(move |packet: MqttPacket| {
            let shared = handler_shared.clone();
            Box::pin(async move {
                if let MqttPacket::Publish(publish) = packet {
                    handle_inbound_publish(&shared, publish).await;
                }
            }) as BoxFuture
        }),
    );
}

/// Completes the QoS handshake (if any) for an inbound PUBLISH, then fans the
/// delivery out to every topic handler whose filter matches the concrete
/// topic. The two concerns are independent: a slow or absent topic handler
/// must not delay the PUBACK/PUBREC-PUBREL-PUBCOMP round trip.
async fn handle_inbound_publish<S>(shared: &Arc<Shared<S>>, publish: PublishPacket)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    match (publish.qos, publish.packet_id) {
        (QosLevel::AtLeastOnce, Some(id)) => {
            let ack = PubAckPacket::new(id);
            if let Err(err) = send_locked(&shared.writer, &shared.refilled, &ack.encode()).await {
                shared.logger.error(&format!("failed to send PUBACK: {err}"));
            } else {
                shared.send_idle.notify_one();
            }
        }
        (QosLevel::ExactlyOnce, Some(id)) => {
            let rec = PubRecPacket::new(id);
            if let Err(err) = send_locked(&shared.writer, &shared.refilled, &rec.encode()).await {
                shared.logger.error(&format!("failed to send PUBREC: {err}"));
                return;
            }
            shared.send_idle.notify_one();

            // Correlate the follow-up PUBREL by the publisher-assigned id,
            // rather than accepting any PUBREL regardless of id. A failed
            // wait means the connection dropped before PUBREL arrived; the
            // peer will redeliver the PUBLISH, so just stop here.
            if shared.dispatcher.await_msg(PacketType::PUBREL, Some(id)).await.is_err() {
                return;
            }

            let comp = PubCompPacket::new(id);
            if let Err(err) = send_locked(&shared.writer, &shared.refilled, &comp.encode()).await {
                shared.logger.error(&format!("failed to send PUBCOMP: {err}"));
            } else {
                shared.send_idle.notify_one();
            }
        }
        _ => {}
    }

    let topic = match TopicName::from_str(&publish.topic) {
        Ok(topic) => topic,
        Err(err) => {
            shared.logger.warning(&format!("dropping inbound PUBLISH with malformed topic: {err}"));
            return;
        }
    };

    let matches: Vec<Arc<dyn Fn(String, Bytes) + Send + Sync>> = {
        let handlers = shared.topic_handlers.lock().unwrap();
        handlers
            .iter()
            .filter(|entry| topic == entry.filter)
            .map(|entry| entry.callback.clone())
            .collect()
    };

    for callback in matches {
        callback(publish.topic.clone(), publish.payload.clone());
    }
}

async fn keep_alive_loop<S>(keep_alive_secs: u16, shared: Arc<Shared<S>>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let window = Duration::from_secs(keep_alive_secs as u64);

    loop {
        match tokio::time::timeout(window, shared.send_idle.notified()).await {
            Ok(()) => continue, // a send happened; the idle window restarts
            Err(_) => {
                if let Err(err) = send_locked(&shared.writer, &shared.refilled, &PingReqPacket.encode()).await {
                    shared.logger.warning(&format!("keep-alive PINGREQ failed: {err}"));
                    continue;
                }
                shared.send_idle.notify_one();
                let _ = shared.dispatcher.await_msg(PacketType::PINGRESP, None).await;
            }
        }
    }
}

async fn receive_loop<S>(mut read_half: ReadHalf<S>, shared: Arc<Shared<S>>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    loop {
        match read_packet(&mut read_half).await {
            Ok(packet) => {
                shared.dispatcher.dispatch(packet);
            }
            Err(err) => {
                shared.logger.warning(&format!("receive loop observed {err}"));

                // Any caller blocked in `await_msg` for this connection can
                // never be satisfied now; fail it rather than leave it
                // pending across the reconnect (there is no app-level retry).
                shared.dispatcher.fail_all_waiters();

                let reconnect_period = *shared.reconnect_period.lock().unwrap();
                match reconnect_period {
                    Some(period) => match reconnect(&shared, period).await {
                        Some(new_read_half) => {
                            read_half = new_read_half;
                        }
                        None => return,
                    },
                    None => {
                        shared.logger.error("connection lost and no reconnect_period configured");
                        return;
                    }
                }
            }
        }
    }
}

async fn reconnect<S>(shared: &Arc<Shared<S>>, period: u64) -> Option<ReadHalf<S>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    {
        let mut writer = shared.writer.lock().await;
        *writer = None;
    }

    loop {
        match attempt_reconnect(shared).await {
            Ok(read_half) => {
                shared.logger.info("reconnect succeeded");
                let callback = shared.reconnect_cb.lock().unwrap().clone();
                if let Some(callback) = callback {
                    tokio::spawn(async move {
                        callback();
                    });
                }
                return Some(read_half);
            }
            Err(err) => {
                shared.logger.warning(&format!("reconnect attempt failed: {err}, retrying in {period}s"));
                tokio::time::sleep(Duration::from_secs(period)).await;
            }
        }
    }
}

async fn attempt_reconnect<S>(shared: &Arc<Shared<S>>) -> Result<ReadHalf<S>, ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let stream = (shared.connector)().await?;
    let (mut read_half, mut write_half) = split(stream);

    let connect_packet = build_connect_packet(&shared.config);
    write_half.write_all(&connect_packet.encode()?).await?;

    let connack = await_connack(&mut read_half, shared.config.connect_timeout()).await?;

    if connack.return_code != ConnectReturnCode::Accept {
        return Err(ClientError::new(ErrorKind::ConnectRejected(connack.return_code), String::new()));
    }

    {
        let mut writer = shared.writer.lock().await;
        *writer = Some(write_half);
    }
    shared.refilled.notify_waiters();

    return Ok(read_half);
}

#[cfg(test)]
mod session {
    use super::build_connect_packet;
    use crate::config::ClientConfig;

    #[test]
    fn connect_packet_carries_config_fields() {
        let config = ClientConfig::builder("client-42", "localhost", 1883).with_keep_alive(15);
        let packet = build_connect_packet(&config);

        assert_eq!(packet.client_id, "client-42");
        assert_eq!(packet.keep_alive, 15);
        assert!(packet.clean_session);
        assert!(packet.will.is_none());
    }
}
