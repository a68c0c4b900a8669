//! The two periodic tasks behind an [`Engine`]: the delivery scan and the bandwidth window
//! reset. They share nothing but the engine state and run independently of each other.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::{task::JoinSet, time::Interval};
use tracing::info;

use crate::Engine;

/// Runs [`Engine::tick`] on every interval tick.
pub(crate) struct DeliveryDriver {
    engine: Engine,
    interval: Interval,
}

impl DeliveryDriver {
    pub(crate) fn new(engine: Engine, interval: Interval) -> Self {
        Self { engine, interval }
    }
}

impl Future for DeliveryDriver {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        while this.interval.poll_tick(cx).is_ready() {
            this.engine.tick();
        }

        Poll::Pending
    }
}

/// Runs [`Engine::reset_bandwidth_window`] once per bandwidth window.
pub(crate) struct BandwidthDriver {
    engine: Engine,
    interval: Interval,
}

impl BandwidthDriver {
    pub(crate) fn new(engine: Engine, interval: Interval) -> Self {
        Self { engine, interval }
    }
}

impl Future for BandwidthDriver {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        while this.interval.poll_tick(cx).is_ready() {
            this.engine.reset_bandwidth_window();
        }

        Poll::Pending
    }
}

/// Owns the running drivers of an [`Engine`]. Dropping the handle aborts them.
#[derive(Debug)]
pub struct EngineHandle {
    engine: Engine,
    tasks: JoinSet<()>,
}

impl EngineHandle {
    pub(crate) fn new(engine: Engine, tasks: JoinSet<()>) -> Self {
        Self { engine, tasks }
    }

    /// The engine driven by this handle.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Stops both drivers and discards every pending message. Returns how many messages were
    /// discarded.
    pub async fn shutdown(mut self) -> usize {
        self.tasks.shutdown().await;
        let discarded = self.engine.discard_pending();
        info!(discarded, "Impairment engine stopped");
        discarded
    }
}
