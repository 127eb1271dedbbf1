use crate::app::time::now_millis;
use crate::game::input::parse_axis;
use crate::game::types::Point;
use crate::protocol::seq_newer_than;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::sync::{mpsc, Notify};

/// Newest-wins slot for outbound state frames. A slow socket never queues
/// stale snapshots; it simply skips to the latest one.
#[derive(Debug)]
pub struct LatestFrame {
    frame: StdMutex<Option<Vec<u8>>>,
    notify: Notify,
}

impl LatestFrame {
    pub(crate) fn new() -> Self {
        Self {
            frame: StdMutex::new(None),
            notify: Notify::new(),
        }
    }

    pub(crate) fn store(&self, payload: Vec<u8>) {
        *self.frame.lock().unwrap() = Some(payload);
        self.notify.notify_one();
    }

    pub fn take_latest(&self) -> Option<Vec<u8>> {
        self.frame.lock().unwrap().take()
    }

    pub async fn wait_for_update(&self) {
        self.notify.notified().await;
    }
}

/// Latest cumulative input from one session, written by the socket task and
/// read by the tick at its start. Inputs are full state (axis + boost), so
/// overwriting a not-yet-applied message is the intended loss semantics.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SessionInboundState {
    pub(crate) input_axis: Option<Point>,
    pub(crate) boost: bool,
    pub(crate) input_seq: Option<u16>,
    pub(crate) last_input_at: i64,
    pub(crate) view_center: Option<Point>,
}

#[derive(Debug)]
pub struct SessionInbound {
    inner: StdMutex<SessionInboundState>,
}

impl SessionInbound {
    pub(crate) fn new() -> Self {
        Self {
            inner: StdMutex::new(SessionInboundState::default()),
        }
    }

    pub(crate) fn update_input(
        &self,
        seq: u16,
        axis: Option<Point>,
        boost: bool,
        view_center: Option<Point>,
    ) {
        let mut state = self.inner.lock().unwrap();
        // Unordered delivery: an older sequence must not clobber a newer one.
        if let Some(current) = state.input_seq {
            if !seq_newer_than(seq, current) {
                return;
            }
        }
        state.input_seq = Some(seq);
        if let Some(axis) = axis.and_then(parse_axis) {
            state.input_axis = Some(axis);
        }
        state.boost = boost;
        if let Some(view_center) = view_center.and_then(parse_axis) {
            state.view_center = Some(view_center);
        }
        state.last_input_at = now_millis();
    }

    pub(crate) fn snapshot(&self) -> SessionInboundState {
        *self.inner.lock().unwrap()
    }
}

pub struct SessionIo {
    pub session_id: String,
    pub inbound: Arc<SessionInbound>,
    pub outbound_state: Arc<LatestFrame>,
    pub outbound_ctl_rx: mpsc::UnboundedReceiver<Vec<u8>>,
}
