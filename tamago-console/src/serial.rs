use log::trace;
use std::collections::VecDeque;
use vm::{
    memory::{SERIAL_PINS, SERIAL_STATE},
    value_is_high, Engine, HIGH, LOW,
};

/// One transfer over the serial port, as the 16 pin bytes
pub type Packet = [u8; 16];

/// Host end of the half-duplex serial port
#[derive(Default)]
pub struct Serial {
    /// Packets waiting for the port to be idle
    incoming: VecDeque<Packet>,
}

impl Serial {
    pub fn reset(&mut self) {
        self.incoming.clear();
    }

    /// Queues a packet for delivery to the program
    pub fn receive(&mut self, p: Packet) {
        self.incoming.push_back(p);
    }

    /// Delivers the next queued packet, if the port is idle
    pub fn deliver(&mut self, vm: &mut Engine) {
        if vm.memory().map().serial_state != [LOW, LOW] {
            return;
        }
        if let Some(p) = self.incoming.pop_front() {
            trace!("serial in: {p:02x?}");
            let m = vm.memory_mut();
            m.write_region(SERIAL_PINS, 0, &p);
            m.write_region(SERIAL_STATE, 0, &[LOW, HIGH]);
        }
    }

    /// Collects an outgoing packet, if the program has sent one
    ///
    /// Collecting the packet returns the port to idle.
    pub fn poll(&mut self, vm: &mut Engine) -> Option<Packet> {
        let [tx, rx] = vm.memory().map().serial_state;
        if !(value_is_high(tx) && !value_is_high(rx)) {
            return None;
        }
        let m = vm.memory_mut();
        let p = m.map().serial_pins;
        m.write_region(SERIAL_STATE, 0, &[LOW, LOW]);
        trace!("serial out: {p:02x?}");
        Some(p)
    }
}
