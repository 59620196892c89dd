//! Integration tests for the async driver.

use bytes::Bytes;
use mesh_transport::driver::{self, DriverPorts, TransportEvent};
use mesh_transport::{Address, KeyId, NetworkPdu, SzMic, TransportConfig};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const LOCAL: Address = Address(0x0001);
const PEER: Address = Address(0x0100);

fn ports() -> DriverPorts {
    let counter = Arc::new(AtomicU32::new(0x1000));
    DriverPorts {
        next_seq: Box::new(move |_src| counter.fetch_add(1, Ordering::Relaxed)),
        iv_index: Box::new(|| 1),
    }
}

async fn next_event(driver: &mut driver::TransportDriver) -> TransportEvent {
    timeout(Duration::from_secs(1), driver.events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_send_access_emits_pdus() {
    let mut transport = driver::spawn(TransportConfig::new(LOCAL), ports()).unwrap();

    let segments = transport
        .handle
        .send_access(
            Bytes::from_static(b"hi"),
            PEER,
            KeyId::Application(0x05),
            SzMic::Mic32,
        )
        .await
        .unwrap();
    assert_eq!(segments.len(), 1);

    match next_event(&mut transport).await {
        TransportEvent::Pdu(pdu) => {
            assert_eq!(pdu.dst, PEER);
            assert_eq!(pdu.transport_pdu, segments[0].transport_pdu);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let stats = transport.handle.stats().await.unwrap();
    assert_eq!(stats.segments_sent, 1);
}

#[tokio::test]
async fn test_inbound_reassembly_acks_then_delivers() {
    let mut transport = driver::spawn(TransportConfig::new(LOCAL), ports()).unwrap();

    // Two-segment access message addressed to our unicast address:
    // AKF=1, AID=0x05, SeqZero=0x0001, 12 + 1 payload bytes.
    let payload: Vec<u8> = (1..=13).collect();
    let mut seg0 = vec![0xC5, 0x00, 0x04, 0x01];
    seg0.extend_from_slice(&payload[..12]);
    let mut seg1 = vec![0xC5, 0x00, 0x04, 0x21];
    seg1.extend_from_slice(&payload[12..]);

    for (i, raw) in [seg0, seg1].into_iter().enumerate() {
        transport
            .inbound
            .send(NetworkPdu {
                src: PEER,
                dst: LOCAL,
                ttl: 3,
                ctl: false,
                seq: 0x0001 + i as u32,
                transport_pdu: Bytes::from(raw),
            })
            .await
            .unwrap();
    }

    // SeqAuth commit for persistence, then the ack, then the delivery.
    match next_event(&mut transport).await {
        TransportEvent::SeqAuthCommitted(src, _) => assert_eq!(src, PEER),
        other => panic!("unexpected event: {other:?}"),
    }
    match next_event(&mut transport).await {
        TransportEvent::AckRequired(ack) => {
            assert_eq!(ack.dst, PEER);
            assert_eq!(ack.ttl, Some(3));
        }
        other => panic!("unexpected event: {other:?}"),
    }
    match next_event(&mut transport).await {
        TransportEvent::Access(msg) => {
            assert_eq!(msg.src, PEER);
            assert_eq!(&msg.payload[..], &payload[..]);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_incomplete_timeout_surfaces() {
    let config = TransportConfig::new(LOCAL).incomplete_timer(10_000);
    let mut transport = driver::spawn(config, ports()).unwrap();

    // One segment of a three-segment message to a group address, then
    // nothing: the incomplete timer must fire and surface the source.
    let mut seg0 = vec![0xC5, 0x00, 0x04, 0x02];
    seg0.extend_from_slice(&[0u8; 12]);
    transport
        .inbound
        .send(NetworkPdu {
            src: PEER,
            dst: Address(0xC000),
            ttl: 3,
            ctl: false,
            seq: 0x0001,
            transport_pdu: Bytes::from(seg0),
        })
        .await
        .unwrap();

    match next_event(&mut transport).await {
        TransportEvent::SeqAuthCommitted(src, _) => assert_eq!(src, PEER),
        other => panic!("unexpected event: {other:?}"),
    }

    // Wait out the 10 s incomplete timer on the paused test clock.
    let expiry = timeout(Duration::from_secs(15), transport.events.recv());
    let event = expiry.await.expect("timed out").expect("channel closed");
    match event {
        TransportEvent::IncompleteTimeout(src) => assert_eq!(src, PEER),
        other => panic!("unexpected event: {other:?}"),
    }
}
