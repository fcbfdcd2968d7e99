//! 신뢰 송신 (send_reliable) 통합 테스트
//!
//! 루프백의 실제 UDP 소켓을 가짜 피어로 사용함.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;

use swft::{Config, Endpoint, Error, Packet, PacketType};

fn test_config(timeout_ms: u64, max_retries: u32) -> Config {
    Config {
        chunk_size: 64,
        timeout_ms,
        max_retries,
        ..Config::default()
    }
}

/// 엔드포인트와 가짜 피어 소켓
async fn pair(config: Config) -> (Endpoint, UdpSocket) {
    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let endpoint = Endpoint::bind(
        "127.0.0.1:0".parse().unwrap(),
        peer.local_addr().unwrap(),
        config,
    )
    .await
    .unwrap();
    (endpoint, peer)
}

async fn recv_packet(socket: &UdpSocket, wait: Duration) -> Option<(Packet, SocketAddr)> {
    let mut buf = vec![0u8; 2048];
    match tokio::time::timeout(wait, socket.recv_from(&mut buf)).await {
        Ok(Ok((len, from))) => Some((Packet::decode(&buf[..len]).unwrap(), from)),
        _ => None,
    }
}

async fn send(socket: &UdpSocket, packet: &Packet, to: SocketAddr) {
    socket.send_to(&packet.encode().unwrap(), to).await.unwrap();
}

#[tokio::test]
async fn succeeds_after_dropped_attempts() {
    let (mut endpoint, peer) = pair(test_config(100, 3)).await;

    // 처음 두 번은 조용히 버리고 세 번째에 ACK
    let peer_task = tokio::spawn(async move {
        let mut seen = 0;
        let mut delivered = Vec::new();
        while let Some((packet, from)) = recv_packet(&peer, Duration::from_secs(2)).await {
            seen += 1;
            if seen < 3 {
                continue;
            }
            delivered.push(packet.payload.clone());
            send(&peer, &Packet::ack(packet.sequence_num), from).await;
            break;
        }
        (seen, delivered)
    });

    endpoint
        .send_reliable(PacketType::Data, 1, &b"hello"[..])
        .await
        .unwrap();

    let (seen, delivered) = peer_task.await.unwrap();
    assert_eq!(seen, 3);
    assert_eq!(delivered.len(), 1);
    assert_eq!(&delivered[0][..], b"hello");
    assert_eq!(endpoint.stats().retransmissions, 2);
    assert_eq!(endpoint.stats().timeouts, 2);
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
    let (mut endpoint, peer) = pair(test_config(50, 4)).await;

    let result = endpoint.send_reliable(PacketType::Fin, 9, Bytes::new()).await;
    assert!(matches!(
        result,
        Err(Error::RetryExhausted {
            sequence_num: 9,
            attempts: 4
        })
    ));

    let mut transmissions = 0;
    while let Some((packet, _)) = recv_packet(&peer, Duration::from_millis(100)).await {
        assert_eq!(packet.packet_type, PacketType::Fin);
        assert_eq!(packet.sequence_num, 9);
        transmissions += 1;
    }
    assert_eq!(transmissions, 4);
}

#[tokio::test]
async fn peer_error_is_terminal() {
    let (mut endpoint, peer) = pair(test_config(200, 5)).await;

    let peer_task = tokio::spawn(async move {
        let (packet, from) = recv_packet(&peer, Duration::from_secs(2)).await.unwrap();
        let error = Packet::new(PacketType::Error, packet.sequence_num, &b"disk full"[..]);
        send(&peer, &error, from).await;
        // 더 이상의 재전송은 없어야 함
        recv_packet(&peer, Duration::from_millis(400)).await.is_none()
    });

    let result = endpoint
        .send_reliable(PacketType::Data, 4, &b"chunk"[..])
        .await;
    match result {
        Err(Error::PeerAbort(reason)) => assert_eq!(reason, "disk full"),
        other => panic!("expected PeerAbort, got {:?}", other),
    }
    assert!(peer_task.await.unwrap());
}

#[tokio::test]
async fn ignores_foreign_mismatched_and_malformed_replies() {
    let (mut endpoint, peer) = pair(test_config(1000, 2)).await;
    let endpoint_addr = endpoint.local_addr().unwrap();

    let peer_task = tokio::spawn(async move {
        let intruder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let (packet, from) = recv_packet(&peer, Duration::from_secs(2)).await.unwrap();
        assert_eq!(from, endpoint_addr);

        // 다른 주소의 올바른 ACK, 잘못된 시퀀스의 ACK, 깨진 데이터그램
        send(&intruder, &Packet::ack(packet.sequence_num), from).await;
        send(&peer, &Packet::ack(packet.sequence_num + 5), from).await;
        peer.send_to(&[0xFF, 0x00, 0x01], from).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        send(&peer, &Packet::ack(packet.sequence_num), from).await;
    });

    endpoint
        .send_reliable(PacketType::Data, 2, &b"payload"[..])
        .await
        .unwrap();
    peer_task.await.unwrap();

    let stats = endpoint.stats();
    assert_eq!(stats.retransmissions, 0);
    assert_eq!(stats.foreign, 1);
    assert_eq!(stats.malformed, 1);
}

#[tokio::test]
async fn reacknowledges_retransmitted_syn_while_sending_first_chunk() {
    let (mut endpoint, peer) = pair(test_config(1000, 2)).await;

    // 피어가 우리 SYN ACK를 잃고 SYN을 재전송하는 상황
    let peer_task = tokio::spawn(async move {
        let (data, from) = recv_packet(&peer, Duration::from_secs(2)).await.unwrap();
        assert_eq!(data.packet_type, PacketType::Data);

        send(&peer, &Packet::new(PacketType::Syn, 0, &b"DOWNLOAD|a"[..]), from).await;
        let (reack, _) = recv_packet(&peer, Duration::from_secs(2)).await.unwrap();

        send(&peer, &Packet::ack(data.sequence_num), from).await;
        reack
    });

    endpoint
        .send_reliable(PacketType::Data, 1, &b"first"[..])
        .await
        .unwrap();

    let reack = peer_task.await.unwrap();
    assert_eq!(reack, Packet::ack(0));
    assert_eq!(endpoint.stats().duplicates, 1);
}

#[tokio::test]
async fn lower_sequences_from_a_new_session_are_not_acknowledged() {
    let (mut endpoint, peer) = pair(test_config(150, 3)).await;

    // 마지막 FIN의 ACK가 유실된 뒤 같은 주소에서 새 업로드가 시작되는 상황
    let peer_task = tokio::spawn(async move {
        let (fin, from) = recv_packet(&peer, Duration::from_secs(2)).await.unwrap();
        assert_eq!(fin.packet_type, PacketType::Fin);

        send(&peer, &Packet::new(PacketType::Syn, 0, &b"UPLOAD|up.txt"[..]), from).await;
        send(&peer, &Packet::new(PacketType::Data, 1, &b"abc"[..]), from).await;
        send(&peer, &Packet::new(PacketType::Fin, 2, Bytes::new()), from).await;

        let mut acks = Vec::new();
        while let Some((packet, _)) = recv_packet(&peer, Duration::from_millis(600)).await {
            if packet.packet_type == PacketType::Ack {
                acks.push(packet.sequence_num);
            }
        }
        acks
    });

    let result = endpoint.send_reliable(PacketType::Fin, 11, Bytes::new()).await;
    assert!(matches!(result, Err(Error::RetryExhausted { .. })));

    assert!(peer_task.await.unwrap().is_empty());
    assert_eq!(endpoint.stats().acks_sent, 0);
}

#[tokio::test]
async fn syn_is_not_reacknowledged_once_peer_has_acknowledged() {
    let (mut endpoint, peer) = pair(test_config(150, 2)).await;

    let peer_task = tokio::spawn(async move {
        let (first, from) = recv_packet(&peer, Duration::from_secs(2)).await.unwrap();
        send(&peer, &Packet::ack(first.sequence_num), from).await;

        let (second, _) = recv_packet(&peer, Duration::from_secs(2)).await.unwrap();
        assert_eq!(second.sequence_num, 2);
        send(&peer, &Packet::new(PacketType::Syn, 0, &b"DOWNLOAD|a"[..]), from).await;

        let mut acks = 0;
        while let Some((packet, _)) = recv_packet(&peer, Duration::from_millis(400)).await {
            if packet.packet_type == PacketType::Ack {
                acks += 1;
            }
        }
        acks
    });

    endpoint
        .send_reliable(PacketType::Data, 1, &b"one"[..])
        .await
        .unwrap();
    let result = endpoint.send_reliable(PacketType::Data, 2, &b"two"[..]).await;
    assert!(result.is_err());

    assert_eq!(peer_task.await.unwrap(), 0);
    assert_eq!(endpoint.stats().duplicates, 0);
}

#[tokio::test]
async fn abort_is_best_effort() {
    let (mut endpoint, peer) = pair(test_config(30, 2)).await;

    // 아무도 확인하지 않아도 에러 없이 반환
    endpoint.send_abort(3, "Transfer interrupted").await;

    let (packet, _) = recv_packet(&peer, Duration::from_millis(200)).await.unwrap();
    assert_eq!(packet.packet_type, PacketType::Error);
    assert_eq!(packet.sequence_num, 3);
    assert_eq!(&packet.payload[..], b"Transfer interrupted");
}
