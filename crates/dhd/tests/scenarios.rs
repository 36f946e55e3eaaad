//! End-to-end behavior of the driver core.
//!
//! Everything here runs against in-memory collaborators
//! ([`RecordingTransport`], [`InterfaceTable`], channel sinks), so no
//! hardware is needed.

use std::sync::Arc;

use dhd::dongle::bss::{BssBuilder, escan_buffer, results_buffer};
use dhd::dongle::iovar::{IoVar, IoVarKind, Registry, length_check};
use dhd::dongle::{
    Action, DiscardPolicy, Dispatcher, DriverConfig, DriverContext, Enqueue, Error, EventBuilder,
    EventRouter, EventStatus, EventType, FirmwareIovars, IfAction, IfEvent, InterfaceTable, PktQ,
    RecordingTransport, ScanCache, ScanStatus,
};

const A: [u8; 6] = [0x00, 0x90, 0x4c, 0x00, 0x00, 0x0a];
const B: [u8; 6] = [0x00, 0x90, 0x4c, 0x00, 0x00, 0x0b];
const C: [u8; 6] = [0x00, 0x90, 0x4c, 0x00, 0x00, 0x0c];

fn bss(bssid: [u8; 6], ssid: &str) -> Vec<u8> {
    BssBuilder::new(bssid).ssid(ssid).rssi(-50).build()
}

fn partial(records: &[Vec<u8>]) -> Vec<u8> {
    results_buffer(ScanStatus::Partial, records)
}

mod iovar_tests {
    use super::*;

    /// One descriptor of every kind.
    static EVERY_KIND: &[IoVar] = &[
        IoVar::new("v_void", 1, IoVarKind::Void, 0),
        IoVar::new("v_bool", 2, IoVarKind::Bool, 0),
        IoVar::new("v_int8", 3, IoVarKind::Int8, 0),
        IoVar::new("v_uint8", 4, IoVarKind::Uint8, 0),
        IoVar::new("v_int16", 5, IoVarKind::Int16, 0),
        IoVar::new("v_uint16", 6, IoVarKind::Uint16, 0),
        IoVar::new("v_int32", 7, IoVarKind::Int32, 0),
        IoVar::new("v_uint32", 8, IoVarKind::Uint32, 0),
        IoVar::new("v_buffer", 9, IoVarKind::Buffer, 64),
    ];

    fn registries() -> [Registry; 2] {
        [Registry::new(EVERY_KIND), Registry::generic()]
    }

    #[test]
    fn test_get_rejects_short_buffer_for_every_kind() {
        for registry in registries() {
            for vi in registry.iter() {
                let vi = registry.lookup(vi.name).unwrap();
                let needed = vi.required_len(false);
                for len in 0..needed {
                    let err = length_check(vi, len, false).unwrap_err();
                    assert!(err.is_buffer_too_short(), "{} accepted {len} bytes", vi.name);
                }
                length_check(vi, needed, false).unwrap();
            }
        }
    }

    #[test]
    fn test_set_with_params_rejected_for_every_name() {
        let ctx = Arc::new(DriverContext::default());
        ctx.set_up(true);
        let dhd = Dispatcher::new(ctx.clone())
            .with_layer(FirmwareIovars::new(Arc::new(RecordingTransport::new())));

        for vi in Registry::generic().iter() {
            let before = ctx.snapshot();
            let mut arg = 1i32.to_le_bytes();
            let err = dhd
                .request(vi.name, Some(&[7u8][..]), &mut arg, Action::Set)
                .unwrap_err();
            assert!(matches!(err, Error::BadArg(_)), "{}: {err}", vi.name);

            // nothing was applied
            let after = ctx.snapshot();
            assert_eq!(after.msg_level, before.msg_level);
            assert_eq!(after.watchdog_ms, before.watchdog_ms);
            assert_eq!(after.ioctl_timeout_ms, before.ioctl_timeout_ms);
        }
    }

    #[test]
    fn test_wdtick_needs_link_up() {
        let ctx = Arc::new(DriverContext::default());
        let dhd = Dispatcher::new(ctx.clone());
        let five = 5u32.to_le_bytes();

        assert!(matches!(dhd.set("wdtick", &five), Err(Error::NotUp)));

        ctx.set_up(true);
        dhd.set("wdtick", &five).unwrap();

        let mut out = [0u8; 4];
        assert_eq!(dhd.get("wdtick", &[], &mut out).unwrap(), 4);
        assert_eq!(u32::from_le_bytes(out), 5);

        // "dump" is a buffer: a GET needs the full reply size
        let mut small = [0u8; 16];
        assert!(dhd.get("dump", &[], &mut small).unwrap_err().is_buffer_too_short());
    }

    #[test]
    fn test_unknown_name_reaches_firmware() {
        let t = Arc::new(RecordingTransport::new());
        t.reply("country", b"US\0\0".to_vec());
        let dhd = Dispatcher::new(Arc::new(DriverContext::default()))
            .with_layer(FirmwareIovars::new(t.clone()));

        let mut out = [0u8; 8];
        assert_eq!(dhd.get("country", &[], &mut out).unwrap(), 4);
        assert_eq!(&out[..2], b"US");
        assert_eq!(t.commands()[0].var_name(), Some("country"));

        // the generic table answers its own names without the firmware
        dhd.get("msglevel", &[], &mut out).unwrap();
        assert_eq!(t.commands().len(), 1);
    }
}

mod queue_tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_full_queue_evicts_oldest_low_precedence() {
        // capacity 4; precedence 0 is capped at three packets
        let mut q = PktQ::new(2, 4).prec_limit(0, 3);
        let policy = DiscardPolicy::all_oldest();
        for (pkt, prec) in [(1, 0), (2, 0), (3, 0), (4, 1)] {
            assert_eq!(q.prec_enq(pkt, prec, policy), Enqueue::Accepted);
        }
        assert!(q.is_full());
        assert!(q.prec_full(0));

        assert_eq!(q.prec_enq(5, 1, policy), Enqueue::AcceptedEvicting(1));
        assert_eq!(q.len(), 4);
        assert_eq!(q.iter_prec(0).copied().collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(q.iter_prec(1).copied().collect::<Vec<_>>(), vec![4, 5]);

        let order: Vec<usize> = std::iter::from_fn(|| q.deq().map(|(p, _)| p)).collect();
        assert_eq!(order, vec![1, 1, 0, 0]);
    }

    proptest! {
        #[test]
        fn prop_enqueue_respects_capacity_and_precedence(
            num_prec in 1usize..8,
            capacity in 1usize..12,
            limits in proptest::collection::vec(0usize..8, 8),
            policy in any::<u16>(),
            ops in proptest::collection::vec(0usize..8, 0..64),
        ) {
            let mut q = PktQ::new(num_prec, capacity);
            for (prec, &limit) in limits.iter().enumerate().take(num_prec) {
                q.set_prec_limit(prec, limit);
            }
            let policy = DiscardPolicy::from_bits(policy);

            for (seq, &prec) in ops.iter().enumerate() {
                let prec = prec % num_prec;
                match q.prec_enq((prec, seq), prec, policy) {
                    Enqueue::Accepted => {}
                    Enqueue::AcceptedEvicting((victim, _)) => {
                        prop_assert!(victim <= prec, "evicted prec {victim} for prec {prec}");
                    }
                    Enqueue::Rejected((p, s)) => prop_assert_eq!((p, s), (prec, seq)),
                }
                prop_assert!(q.len() <= capacity);
                let held: usize = (0..num_prec).map(|p| q.prec_len(p)).sum();
                prop_assert_eq!(held, q.len());
            }
        }
    }
}

mod event_tests {
    use super::*;
    use dhd::dongle::stream;
    use tokio_stream::StreamExt;

    /// Vendor OUI and user subtype positions in an event frame.
    const OUI: std::ops::Range<usize> = 19..22;
    const USR_SUBTYPE: std::ops::Range<usize> = 22..24;

    fn if_add(ifidx: u8, name: &str) -> Vec<u8> {
        let ev = IfEvent {
            ifidx,
            action: IfAction::Add,
            flags: 0,
            bssidx: ifidx,
        };
        EventBuilder::new(EventType::If)
            .ifname(name)
            .data(ev.to_bytes().to_vec())
            .build()
    }

    #[test]
    fn test_corrupted_signature_leaves_state_untouched() {
        let ctx = Arc::new(DriverContext::default());
        let (sink, _events) = stream::channel();
        let ifs = Arc::new(InterfaceTable::new("wl0"));
        let router = EventRouter::new(ctx.clone(), sink, ifs.clone());

        let good = if_add(3, "wl0.3");
        for pos in OUI.chain(USR_SUBTYPE) {
            let mut frame = good.clone();
            frame[pos] ^= 0x5a;
            let before = frame.clone();

            let err = router.route(&frame, 0).unwrap_err();
            assert!(matches!(err, Error::InvalidFrame(_)), "byte {pos}: {err}");
            assert_eq!(frame, before);
            assert_eq!(ifs.bound(), vec![0]);
            assert_eq!(ctx.conn_status().event, 0);
        }

        router.route(&good, 0).unwrap();
        assert_eq!(ifs.bound(), vec![0, 3]);
    }

    #[tokio::test]
    async fn test_unknown_events_are_forwarded() {
        let ctx = Arc::new(DriverContext::default());
        let (sink, mut events) = stream::channel();
        let router = EventRouter::new(ctx, sink, Arc::new(InterfaceTable::new("wl0")));

        router.route(&if_add(1, "wl0.1"), 0).unwrap();
        let unknown = EventBuilder::new(EventType::Unknown(200))
            .ifname("wl0.1")
            .data(vec![1, 2, 3])
            .build();
        let routed = router.route(&unknown, 0).unwrap();
        assert_eq!(routed.ifidx, 1);
        drop(router);

        let first = events.next().await.unwrap();
        assert_eq!(first.event.event_type, EventType::If);
        let second = events.next().await.unwrap();
        assert_eq!(second.ifidx, 1);
        assert_eq!(second.event.event_type, EventType::Unknown(200));
        assert_eq!(&second.frame[..], &unknown[..]);
        assert!(events.next().await.is_none());
    }

    #[test]
    fn test_escan_events_fill_cache() {
        let cache = Arc::new(ScanCache::default());
        let (sink, _events) = stream::channel();
        let router = EventRouter::new(
            Arc::new(DriverContext::default()),
            sink,
            Arc::new(InterfaceTable::new("wl0")),
        )
        .with_scan_cache(cache.clone());

        for records in [vec![bss(A, "a"), bss(B, "b")], vec![bss(B, "b2")]] {
            let frame = EventBuilder::new(EventType::EscanResult)
                .status(EventStatus::Partial)
                .data(escan_buffer(7, &records))
                .build();
            router.route(&frame, 0).unwrap();
        }
        let ssids: Vec<String> = cache.bss_list().into_iter().map(|e| e.ssid).collect();
        assert_eq!(ssids, vec!["a", "b2"]);
    }
}

mod scan_tests {
    use super::*;

    #[test]
    fn test_overlapping_bssid_keeps_newest() {
        let cache = ScanCache::default();
        cache.start_session();
        let n1 = cache.append(&partial(&[bss(A, "a"), bss(B, "old")])).unwrap()[0];
        let n2 = cache.append(&partial(&[bss(B, "new"), bss(C, "c")])).unwrap()[0];

        let list = cache.bss_list();
        let summary: Vec<_> = list.iter().map(|e| (e.node, e.bssid, e.ssid.as_str())).collect();
        assert_eq!(
            summary,
            vec![(n1, A, "a"), (n2, B, "new"), (n2, C, "c")]
        );
        assert_eq!(list.iter().filter(|e| e.bssid == B).count(), 1);
        assert_eq!(cache.node_records(n1).unwrap().len(), 1);
    }

    #[test]
    fn test_emptied_node_is_unlinked() {
        let cache = ScanCache::default();
        let n1 = cache.append(&partial(&[bss(A, "a")])).unwrap()[0];
        let n2 = cache.append(&partial(&[bss(A, "a"), bss(B, "b")])).unwrap()[0];
        assert_eq!(cache.nodes(), vec![n2]);
        assert!(cache.node_records(n1).is_none());
        // a stale handle stays stale after its slot is reused
        let n3 = cache.append(&partial(&[bss(C, "c")])).unwrap()[0];
        assert_ne!(n1, n3);
        assert!(!cache.free(n1));

        assert_eq!(cache.remove_bssid(&A, None), 1);
        assert_eq!(cache.remove_bssid(&B, None), 1);
        assert_eq!(cache.nodes(), vec![n3]);
        assert_eq!(cache.remove_bssid(&C, None), 1);
        assert!(cache.is_empty());
        assert!(cache.bss_list().is_empty());
    }

    #[test]
    fn test_abort_refuses_until_restart() {
        let cache = ScanCache::new(2);
        cache.append(&partial(&[bss(A, "a")])).unwrap();
        cache.append(&partial(&[bss(B, "b")])).unwrap();
        assert!(matches!(
            cache.append(&partial(&[bss(C, "c")])),
            Err(Error::NoMemory(_))
        ));

        cache.abort();
        assert!(cache.is_empty());
        assert!(matches!(
            cache.append(&partial(&[bss(C, "c")])),
            Err(Error::ScanAborted)
        ));
        cache.start_session();
        assert_eq!(cache.append(&partial(&[bss(C, "c")])).unwrap().len(), 1);
    }
}

mod control_tests {
    use super::*;
    use dhd::dongle::control::{CdcHeader, ControlChannel, reply_frame};
    use dhd::dongle::wlc::wlc_cmd;
    use std::time::Duration;
    use zerocopy::FromBytes;

    #[tokio::test]
    async fn test_replies_match_by_id() {
        let ctx = Arc::new(DriverContext::default());
        let (chan, mut rx) = ControlChannel::new(ctx.clone());
        let chan = Arc::new(chan);

        let first = tokio::spawn({
            let chan = chan.clone();
            async move { chan.request(0, wlc_cmd::GET_VAR, b"a\0\0\0\0\0", false).await }
        });
        let second = tokio::spawn({
            let chan = chan.clone();
            async move { chan.request(0, wlc_cmd::GET_VAR, b"b\0\0\0\0\0", false).await }
        });

        let f1 = rx.recv().await.unwrap();
        let f2 = rx.recv().await.unwrap();
        // answer in reverse order
        for frame in [&f2, &f1] {
            let (hdr, payload) = CdcHeader::ref_from_prefix(frame).unwrap();
            let reply = reply_frame(hdr, 0, &payload[..1]);
            assert!(chan.complete(&reply));
        }

        let mut got = vec![first.await.unwrap().unwrap(), second.await.unwrap().unwrap()];
        got.sort();
        assert_eq!(got, vec![&b"a"[..], &b"b"[..]]);
        assert_eq!(chan.pending(), 0);
        assert_eq!(ctx.snapshot().bus.rx_ctlpkts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_then_late_reply() {
        let ctx = Arc::new(DriverContext::new(DriverConfig::new().ioctl_timeout_ms(50)));
        let (chan, mut rx) = ControlChannel::new(ctx);

        let err = chan.set_var("mpc", &0u32.to_le_bytes()).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(chan.pending(), 0);

        let frame = rx.recv().await.unwrap();
        let (hdr, _) = CdcHeader::ref_from_prefix(&frame).unwrap();
        assert!(!chan.complete(&reply_frame(hdr, 0, &[])));

        tokio::time::advance(Duration::from_millis(10)).await;
        assert_eq!(chan.pending(), 0);
    }
}

mod preinit_tests {
    use super::*;
    use dhd::dongle::{EventMask, preinit};

    #[test]
    fn test_preinit_dry_run() {
        let t = RecordingTransport::new();
        t.reply("ver", b"wl0: Oct 19 2026 version 4.218.248.6\0".to_vec());
        t.fail("roam_off", dhd::dongle::error::bcme::UNSUPPORTED);

        let config = DriverConfig::new()
            .country_code("US")
            .keep_alive_ms(30_000)
            .pkt_filter("100 0 0 0 0x01 0x00");
        let report = preinit(&t, &config, &EventMask::default());

        assert_eq!(
            report.fw_version.as_deref(),
            Some("wl0: Oct 19 2026 version 4.218.248.6")
        );
        let failed: Vec<&str> = report.failures().map(|s| s.name.as_str()).collect();
        assert_eq!(failed, vec!["roam_off"]);

        // a failing step does not stop the ones after it
        let names = t.set_var_names();
        let pos = |n: &str| names.iter().position(|x| x == n).unwrap();
        assert!(pos("bcn_timeout") < pos("event_msgs"));
        assert!(pos("event_msgs") < pos("keep_alive"));
        assert_eq!(t.last_set("keep_alive").unwrap().int_value(), Some(30_000));
    }
}
