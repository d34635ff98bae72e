mod common;

use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use cliprdr_bridge::clipboard::memory::encode_unicode_text;
use cliprdr_bridge::clipboard::{
    BridgeOptions, ClipboardError, ClipboardOwner, NotificationKind, OsClipboard,
    TIMEOUT_NOTIFICATION_TEXT,
};
use cliprdr_bridge::protocol::{ClipboardPdu, FormatListEntry, ResponseStatus};
use common::{data_response, fast_options, no_replies, wait_until, FakePeer};

fn text_list() -> ClipboardPdu {
    ClipboardPdu::FormatList(vec![FormatListEntry::new(13, None)])
}

/// Peer that answers text requests with `text`
fn serve_text(text: &'static str) -> common::Script {
    Box::new(move |pdu| match pdu {
        ClipboardPdu::FormatDataRequest {
            requested_format_id: 13,
        } => vec![data_response(ResponseStatus::Ok, encode_unicode_text(text))],
        _ => Vec::new(),
    })
}

#[test]
fn test_paste_renders_through_the_peer() {
    let peer = FakePeer::start(fast_options(), serve_text("from afar"));
    peer.handshake();
    peer.deliver(text_list());
    wait_until("delayed offer", || {
        peer.clipboard.owner() == ClipboardOwner::Bridge(peer.bridge.id())
    });

    assert_eq!(peer.clipboard.get_text().unwrap(), "from afar");
    // Second paste is served from the rendered copy
    assert_eq!(peer.clipboard.get_text().unwrap(), "from afar");
    assert_eq!(
        peer.count(|pdu| matches!(pdu, ClipboardPdu::FormatDataRequest { .. })),
        1
    );
}

#[test]
fn test_silent_peer_times_out_with_one_notification() {
    let options = BridgeOptions {
        response_timeout: Duration::from_millis(300),
        ..fast_options()
    };
    let peer = FakePeer::start(options, no_replies());
    peer.handshake();
    peer.deliver(text_list());
    wait_until("delayed offer", || {
        peer.clipboard.owner() == ClipboardOwner::Bridge(peer.bridge.id())
    });

    let started = Instant::now();
    let result = peer.clipboard.get_text();
    assert!(matches!(result, Err(ClipboardError::Timeout(300))));
    assert!(started.elapsed() < Duration::from_secs(2));

    let notification = peer
        .notifications
        .recv_timeout(Duration::from_secs(1))
        .unwrap();
    assert_eq!(notification.kind, NotificationKind::Timeout);
    assert_eq!(notification.text, TIMEOUT_NOTIFICATION_TEXT);
    assert_eq!(notification.conn_id, common::CONN_ID);
    assert!(peer.notifications.try_recv().is_err());
}

#[test]
fn test_stop_aborts_waiter_and_empties_clipboard() {
    let peer = FakePeer::start(fast_options(), no_replies());
    peer.handshake();
    peer.deliver(text_list());
    wait_until("delayed offer", || {
        peer.clipboard.owner() == ClipboardOwner::Bridge(peer.bridge.id())
    });

    let clipboard = peer.clipboard.clone();
    let paste = thread::spawn(move || {
        let started = Instant::now();
        (clipboard.get_text(), started.elapsed())
    });
    wait_until("request on the wire", || {
        peer.count(|pdu| matches!(pdu, ClipboardPdu::FormatDataRequest { .. })) == 1
    });
    peer.bridge.stop();

    let (result, elapsed) = paste.join().unwrap();
    assert!(matches!(result, Err(ClipboardError::Aborted)));
    assert!(elapsed < Duration::from_secs(5));
    wait_until("clipboard emptied", || {
        peer.clipboard.owner() == ClipboardOwner::Empty
    });
    assert!(peer.notifications.try_recv().is_err());
}

#[test]
fn test_late_response_after_timeout_is_discarded() {
    let options = BridgeOptions {
        response_timeout: Duration::from_millis(200),
        ..fast_options()
    };
    let peer = FakePeer::start(options, no_replies());
    peer.handshake();
    peer.deliver(text_list());
    wait_until("delayed offer", || {
        peer.clipboard.owner() == ClipboardOwner::Bridge(peer.bridge.id())
    });

    assert!(peer.clipboard.get_text().is_err());
    // Nothing is waiting any more; this must be dropped, not cached
    peer.deliver(data_response(
        ResponseStatus::Ok,
        encode_unicode_text("too late"),
    ));
    assert!(matches!(
        peer.clipboard.get_text(),
        Err(ClipboardError::Timeout(200))
    ));
}

#[test]
fn test_refused_format_surfaces_protocol_failure() {
    let peer = FakePeer::start(
        fast_options(),
        Box::new(|pdu| match pdu {
            ClipboardPdu::FormatDataRequest { .. } => {
                vec![data_response(ResponseStatus::Fail, Bytes::new())]
            }
            _ => Vec::new(),
        }),
    );
    peer.handshake();
    peer.deliver(text_list());
    wait_until("delayed offer", || {
        peer.clipboard.owner() == ClipboardOwner::Bridge(peer.bridge.id())
    });

    assert!(matches!(
        peer.clipboard.get_text(),
        Err(ClipboardError::ProtocolFail(_))
    ));
    assert!(peer.notifications.try_recv().is_err());
}

#[test]
fn test_empty_success_is_not_pasted() {
    let peer = FakePeer::start(
        fast_options(),
        Box::new(|pdu| match pdu {
            ClipboardPdu::FormatDataRequest { .. } => {
                vec![data_response(ResponseStatus::Ok, Bytes::new())]
            }
            _ => Vec::new(),
        }),
    );
    peer.handshake();
    peer.deliver(text_list());
    wait_until("delayed offer", || {
        peer.clipboard.owner() == ClipboardOwner::Bridge(peer.bridge.id())
    });

    assert!(matches!(
        peer.clipboard.get_text(),
        Err(ClipboardError::ProtocolFail(_))
    ));
    // Nothing was cached, so the next paste asks again
    assert!(peer.clipboard.get_text().is_err());
    assert_eq!(
        peer.count(|pdu| matches!(pdu, ClipboardPdu::FormatDataRequest { .. })),
        2
    );
}

#[test]
fn test_busy_clipboard_answers_fail() {
    let peer = FakePeer::start(fast_options(), no_replies());
    peer.clipboard.set_text("local").unwrap();
    peer.handshake();

    peer.clipboard.set_busy(true);
    peer.deliver(ClipboardPdu::FormatDataRequest {
        requested_format_id: 13,
    });
    let response = peer.wait_for("format data response", |pdu| match pdu {
        ClipboardPdu::FormatDataResponse(r) => Some(r.clone()),
        _ => None,
    });
    assert_eq!(response.status, ResponseStatus::Fail);
    assert!(response.data.is_empty());

    peer.clipboard.set_busy(false);
    peer.deliver(ClipboardPdu::FormatDataRequest {
        requested_format_id: 13,
    });
    wait_until("second response", || {
        peer.count(|pdu| matches!(pdu, ClipboardPdu::FormatDataResponse(_))) == 2
    });
    let last = peer
        .seen()
        .into_iter()
        .rev()
        .find_map(|pdu| match pdu {
            ClipboardPdu::FormatDataResponse(r) => Some(r),
            _ => None,
        })
        .unwrap();
    assert_eq!(last.status, ResponseStatus::Ok);
    assert_eq!(last.data, encode_unicode_text("local"));
}

#[test]
fn test_local_copy_is_announced_to_the_peer() {
    let peer = FakePeer::start(fast_options(), no_replies());
    peer.handshake();

    peer.clipboard.set_text("fresh").unwrap();
    let entries = peer.wait_for("announcement", |pdu| match pdu {
        ClipboardPdu::FormatList(entries) if !entries.is_empty() => Some(entries.clone()),
        _ => None,
    });
    assert_eq!(entries, vec![FormatListEntry::new(13, None)]);
}

#[test]
fn test_uninit_while_owning_empties_the_clipboard() {
    let peer = FakePeer::start(fast_options(), no_replies());
    peer.handshake();
    peer.deliver(text_list());
    wait_until("delayed offer", || {
        peer.clipboard.owner() == ClipboardOwner::Bridge(peer.bridge.id())
    });

    let clipboard = peer.clipboard.clone();
    drop(peer);
    wait_until("clipboard released", || clipboard.owner() == ClipboardOwner::Empty);
    assert!(clipboard.available_formats().unwrap().is_empty());
}
