// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Saturation behavior: full queues and an exhausted buffer pool must
//! reject work loudly and recover once the backlog drains, never grow.

use g3adp::pool::{PoolClass, PoolConfig};
use g3adp::qmm::QmmError;
use g3adp::{Adp, AdpConfig, AdpError, AdpEvent};

#[test]
fn test_rx_pool_exhaustion_and_recovery() {
    // Default pool: 3x100 + 3x400 + 1x1280 = 7 buffers.
    let mut adp = Adp::new(AdpConfig::default().with_short_address(1));

    // Well-formed LBP KickToDevice, 10 bytes.
    let frame = [0x02u8, 0x0C, 0, 0, 0, 0, 0, 0, 0, 1];
    for _ in 0..7 {
        adp.on_frame(0x0002, &frame, 0).unwrap();
    }
    assert_eq!(
        adp.on_frame(0x0002, &frame, 0),
        Err(AdpError::PoolExhausted)
    );
    assert_eq!(adp.stats().frames_rx_dropped, 1);

    // Processing the backlog returns every buffer to the pool.
    adp.process(0);
    for _ in 0..7 {
        adp.on_frame(0x0002, &frame, 0).unwrap();
    }
}

#[test]
fn test_rx_queue_full_before_pool() {
    // Queue smaller than the pool: the queue is the limiting resource and
    // must not eat pool budget when it rejects.
    let mut adp = Adp::new(
        AdpConfig::default()
            .with_short_address(1)
            .with_queue_capacities(16, 2),
    );
    let frame = [0x02u8, 0x0C, 0, 0, 0, 0, 0, 0, 0, 1];
    adp.on_frame(0x0002, &frame, 0).unwrap();
    adp.on_frame(0x0002, &frame, 0).unwrap();
    assert_eq!(
        adp.on_frame(0x0002, &frame, 0),
        Err(AdpError::Qmm(QmmError::QueueFull))
    );

    adp.process(0);
    // All three pool classes are whole again after the drain.
    adp.on_frame(0x0002, &frame, 0).unwrap();
    adp.on_frame(0x0002, &frame, 0).unwrap();
}

#[test]
fn test_oversized_frame_rejected_by_pool() {
    let mut adp = Adp::new(AdpConfig::default().with_short_address(1));
    let oversized = vec![0u8; 4096];
    assert_eq!(
        adp.on_frame(0x0002, &oversized, 0),
        Err(AdpError::PoolExhausted)
    );
}

#[test]
fn test_tx_rejects_partial_datagrams() {
    let mut adp = Adp::new(
        AdpConfig::default()
            .with_short_address(1)
            .with_queue_capacities(4, 16)
            .with_fragment_size(100),
    );
    adp.learn_route(0x0009, 0x0002, 1, 0).unwrap();

    // 350 bytes / 100-byte fragments = 4 frames: fills the queue exactly.
    adp.queue_tx(0x0009, &vec![1u8; 350], 4, 0).unwrap();
    assert_eq!(adp.tx_pending(), 4);

    // The next datagram needs 2 frames but has room for none; nothing of
    // it may be enqueued.
    assert_eq!(
        adp.queue_tx(0x0009, &vec![2u8; 150], 4, 0),
        Err(AdpError::Qmm(QmmError::QueueFull))
    );
    assert_eq!(adp.tx_pending(), 4);
    assert_eq!(adp.stats().frames_tx_dropped, 2);

    // Draining restores capacity.
    while adp.next_tx().is_some() {}
    adp.queue_tx(0x0009, &vec![2u8; 150], 4, 0).unwrap();
    assert_eq!(adp.tx_pending(), 2);
}

#[test]
fn test_single_buffer_pool_still_processes() {
    let mut adp = Adp::new(AdpConfig {
        short_address: 1,
        pool: PoolConfig {
            classes: vec![PoolClass { size: 64, count: 1 }],
        },
        ..AdpConfig::default()
    });

    // One frame at a time works indefinitely.
    for round in 0..5u8 {
        let mut frame = vec![0x02, 0x0C]; // LBP KickToDevice
        frame.extend_from_slice(&u64::from(round).to_be_bytes());
        adp.on_frame(0x0002, &frame, 0).unwrap();
        assert_eq!(
            adp.on_frame(0x0002, &frame, 0),
            Err(AdpError::PoolExhausted)
        );
        let events = adp.process(0);
        assert!(matches!(events[0], AdpEvent::LbpIndication { .. }));
    }
}
