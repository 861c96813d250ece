//! NSQ client against a scripted nsqd on a local socket.

mod helpers;

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use telemetry_consumer::queue::nsq::frame::{
    encode_frame, encode_message, CLOSE_WAIT, FRAME_TYPE_ERROR, FRAME_TYPE_RESPONSE, HEARTBEAT,
    MAGIC_V2, RESPONSE_OK,
};
use telemetry_consumer::queue::{Delivery, MessageId, MessageSource, NsqConfig, NsqSource};
use telemetry_consumer::{run_with_source, BackoffPolicy, BatchWriter, Config, QueueError};

use helpers::{create_test_store, stored_ids, telemetry_body, TABLE};

fn nsq_config(address: String) -> NsqConfig {
    NsqConfig {
        address,
        topic: "system_info".to_string(),
        channel: "channel".to_string(),
        client_id: "test-consumer".to_string(),
        policy: BackoffPolicy::Fixed(Duration::from_millis(10)),
        max_attempts: 2,
    }
}

fn delivery(n: u8, body: Vec<u8>) -> Delivery {
    let mut id = *b"0000000000000000";
    id[15] = b'0' + n;
    Delivery {
        id: MessageId::new(id),
        attempts: 1,
        timestamp_ns: 1_700_000_000_000_000_000,
        body,
    }
}

/// Server side of one nsqd connection.
struct FakeNsqd {
    reader: BufReader<TcpStream>,
}

impl FakeNsqd {
    async fn accept(listener: &TcpListener) -> Self {
        let (stream, _) = listener.accept().await.expect("accept");
        FakeNsqd {
            reader: BufReader::new(stream),
        }
    }

    async fn read_line(&mut self) -> String {
        let mut line = String::new();
        self.reader.read_line(&mut line).await.expect("read line");
        line
    }

    async fn send(&mut self, bytes: &[u8]) {
        self.reader.get_mut().write_all(bytes).await.expect("write");
    }

    /// Reads magic, IDENTIFY and SUB; returns the IDENTIFY body.
    async fn handshake(&mut self) -> serde_json::Value {
        let mut magic = [0u8; 4];
        self.reader.read_exact(&mut magic).await.unwrap();
        assert_eq!(&magic, MAGIC_V2);

        assert_eq!(self.read_line().await, "IDENTIFY\n");
        let len = self.reader.read_u32().await.unwrap() as usize;
        let mut body = vec![0u8; len];
        self.reader.read_exact(&mut body).await.unwrap();
        self.send(&encode_frame(FRAME_TYPE_RESPONSE, RESPONSE_OK))
            .await;

        assert_eq!(self.read_line().await, "SUB system_info channel\n");
        self.send(&encode_frame(FRAME_TYPE_RESPONSE, RESPONSE_OK))
            .await;
        assert_eq!(self.read_line().await, "RDY 1\n");

        serde_json::from_slice(&body).expect("IDENTIFY body is JSON")
    }
}

#[tokio::test]
async fn test_subscribe_receive_and_finish() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();

    let server = tokio::spawn(async move {
        let mut nsqd = FakeNsqd::accept(&listener).await;
        let identify = nsqd.handshake().await;
        assert_eq!(identify["client_id"], "test-consumer");
        assert_eq!(identify["feature_negotiation"], false);

        nsqd.send(&encode_message(&delivery(1, b"hello".to_vec())))
            .await;
        let fin = nsqd.read_line().await;
        nsqd.send(&encode_message(&delivery(2, b"again".to_vec())))
            .await;
        let req = nsqd.read_line().await;
        (fin, req)
    });

    let mut source = NsqSource::connect(nsq_config(address)).await.expect("connect");
    let first = source.next_message().await.unwrap().expect("message");
    assert_eq!(first.body, b"hello");
    assert_eq!(first.attempts, 1);
    source.finish(&first.id).await.unwrap();

    let second = source.next_message().await.unwrap().expect("message");
    source
        .requeue(&second.id, Duration::from_millis(2500))
        .await
        .unwrap();

    let (fin, req) = server.await.unwrap();
    assert_eq!(fin, "FIN 0000000000000001\n");
    assert_eq!(req, "REQ 0000000000000002 2500\n");
}

#[tokio::test]
async fn test_heartbeat_is_answered_with_nop() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();

    let server = tokio::spawn(async move {
        let mut nsqd = FakeNsqd::accept(&listener).await;
        nsqd.handshake().await;
        nsqd.send(&encode_frame(FRAME_TYPE_RESPONSE, HEARTBEAT))
            .await;
        let reply = nsqd.read_line().await;
        nsqd.send(&encode_message(&delivery(1, b"after".to_vec())))
            .await;
        reply
    });

    let mut source = NsqSource::connect(nsq_config(address)).await.unwrap();
    let message = source.next_message().await.unwrap().expect("message");
    assert_eq!(message.body, b"after");
    assert_eq!(server.await.unwrap(), "NOP\n");
}

#[tokio::test]
async fn test_subscribe_rejected_by_broker() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();

    tokio::spawn(async move {
        let mut nsqd = FakeNsqd::accept(&listener).await;
        let mut magic = [0u8; 4];
        nsqd.reader.read_exact(&mut magic).await.unwrap();
        nsqd.read_line().await;
        let len = nsqd.reader.read_u32().await.unwrap() as usize;
        let mut body = vec![0u8; len];
        nsqd.reader.read_exact(&mut body).await.unwrap();
        nsqd.send(&encode_frame(FRAME_TYPE_RESPONSE, RESPONSE_OK))
            .await;
        nsqd.read_line().await;
        nsqd.send(&encode_frame(FRAME_TYPE_ERROR, b"E_BAD_TOPIC SUB topic name is not valid"))
            .await;
    });

    match NsqSource::connect(nsq_config(address)).await {
        Err(QueueError::Broker(message)) => assert!(message.contains("E_BAD_TOPIC")),
        Err(other) => panic!("expected broker error, got {other}"),
        Ok(_) => panic!("expected broker error, got a subscription"),
    }
}

#[tokio::test]
async fn test_connect_gives_up_after_max_attempts() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);

    match NsqSource::connect(nsq_config(address.clone())).await {
        Err(QueueError::ConnectExhausted {
            address: failed,
            attempts,
            ..
        }) => {
            assert_eq!(failed, address);
            assert_eq!(attempts, 2);
        }
        Err(other) => panic!("expected exhausted connect, got {other}"),
        Ok(_) => panic!("expected exhausted connect, got a subscription"),
    }
}

#[tokio::test]
async fn test_connection_loss_surfaces_as_closed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();

    tokio::spawn(async move {
        let mut nsqd = FakeNsqd::accept(&listener).await;
        nsqd.handshake().await;
        // dropping the connection ends the stream
    });

    let mut source = NsqSource::connect(nsq_config(address)).await.unwrap();
    assert!(matches!(
        source.next_message().await,
        Err(QueueError::Closed)
    ));
}

#[tokio::test]
async fn test_consumer_writes_batch_and_closes_cleanly() {
    let store = create_test_store().await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let (fin_tx, fin_rx) = oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let mut nsqd = FakeNsqd::accept(&listener).await;
        nsqd.handshake().await;

        let mut lines = Vec::new();
        for n in 1..=3u8 {
            let body = telemetry_body(&format!("host-{n}"));
            nsqd.send(&encode_message(&delivery(n, body))).await;
            lines.push(nsqd.read_line().await);
        }
        let _ = fin_tx.send(());

        lines.push(nsqd.read_line().await);
        lines.push(nsqd.read_line().await);
        nsqd.send(&encode_frame(FRAME_TYPE_RESPONSE, CLOSE_WAIT))
            .await;
        lines
    });

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        let _ = fin_rx.await;
        trigger.cancel();
    });

    let config = Config {
        batch_size: 3,
        ..Default::default()
    };
    let source = NsqSource::connect(nsq_config(address)).await.unwrap();
    let writer = BatchWriter::new(store.pool.clone(), TABLE, 1, Duration::from_secs(10));
    let report = run_with_source(&config, writer, None, source, cancel)
        .await
        .expect("clean shutdown");

    assert_eq!(report.rows_committed, 3);
    assert_eq!(stored_ids(&store.pool).await, vec![1, 2, 3]);
    assert_eq!(
        server.await.unwrap(),
        vec![
            "FIN 0000000000000001\n",
            "FIN 0000000000000002\n",
            "FIN 0000000000000003\n",
            "RDY 0\n",
            "CLS\n",
        ]
    );
}
