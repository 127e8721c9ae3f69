// Licensed under the Apache-2.0 license

use std::sync::atomic::{AtomicBool, Ordering};

/// Host power and boot progress as seen by the BIC. Platform code updates it
/// from GPIO events; sensors consult it before touching the bus.
#[derive(Debug, Default)]
pub struct PowerState {
    dc_on: AtomicBool,
    post_complete: AtomicBool,
    me_normal: AtomicBool,
    vr_monitor: AtomicBool,
}

impl PowerState {
    pub fn new() -> Self {
        PowerState {
            vr_monitor: AtomicBool::new(true),
            ..Default::default()
        }
    }

    pub fn set_dc_on(&self, on: bool) {
        self.dc_on.store(on, Ordering::SeqCst);
    }

    pub fn dc_on(&self) -> bool {
        self.dc_on.load(Ordering::SeqCst)
    }

    pub fn set_post_complete(&self, done: bool) {
        self.post_complete.store(done, Ordering::SeqCst);
    }

    pub fn post_complete(&self) -> bool {
        self.post_complete.load(Ordering::SeqCst)
    }

    pub fn set_me_normal(&self, normal: bool) {
        self.me_normal.store(normal, Ordering::SeqCst);
    }

    pub fn me_normal(&self) -> bool {
        self.me_normal.load(Ordering::SeqCst)
    }

    pub fn set_vr_monitor(&self, enable: bool) {
        self.vr_monitor.store(enable, Ordering::SeqCst);
    }

    pub fn vr_monitor(&self) -> bool {
        self.vr_monitor.load(Ordering::SeqCst)
    }
}

/// Power condition a sensor needs before it can be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AccessChecker {
    #[default]
    Stby,
    Dc,
    Post,
    Me,
    Vr,
}

impl AccessChecker {
    pub fn check(&self, power: &PowerState) -> bool {
        match self {
            AccessChecker::Stby => true,
            AccessChecker::Dc => power.dc_on(),
            AccessChecker::Post => power.post_complete(),
            AccessChecker::Me => power.me_normal() && power.post_complete(),
            AccessChecker::Vr => power.dc_on() && power.vr_monitor(),
        }
    }
}
