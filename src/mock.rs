//! Register-file transport for tests
//!
//! Holds a copy of the register map, records every write and plays the chip's part in
//! the exchange: entering TX raises TxDone/PacketSent, entering RX delivers a queued
//! packet, entering CAD raises CadDone. IRQ registers are write-1-to-clear.
//! A LoRa RxSingle window can be made to close early with RxTimeout, after which the
//! chip drops back to standby on its own.

use std::collections::VecDeque;
use std::vec::Vec;

use crate::transport::{RegisterTransport, FIFO_ADDRESS};

const OP_MODE: u8 = 0x01;
const LORA_IRQ: u8 = 0x12;
const LORA_RX_NB_BYTES: u8 = 0x13;
const LORA_RX_CURRENT_ADDR: u8 = 0x10;
const FSK_IRQ_1: u8 = 0x3E;
const FSK_IRQ_2: u8 = 0x3F;
const VERSION: u8 = 0x42;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusFault;

pub struct MockTransport {
    pub regs: [u8; 128],
    pub writes: Vec<(u8, u8)>,
    pub tx_fifo: Vec<u8>,
    pub rx_fifo: VecDeque<u8>,
    /// Delivered the next time the chip enters an RX mode
    pub pending_rx: Option<Vec<u8>>,
    /// Raise TxDone/PacketSent when entering TX
    pub complete_tx: bool,
    /// Flag the delivered LoRa packet with a CRC error
    pub crc_error: bool,
    pub cad_detected: bool,
    /// LoRa RxSingle entries that end in RxTimeout before a packet is delivered
    pub rx_timeouts: usize,
    /// Fail every access once this many writes have been recorded
    pub fail_after_writes: Option<usize>,
}

impl MockTransport {
    pub fn new(version: u8) -> Self {
        let mut regs = [0u8; 128];
        regs[OP_MODE as usize] = 0x09;
        regs[VERSION as usize] = version;
        Self {
            regs,
            writes: Vec::new(),
            tx_fifo: Vec::new(),
            rx_fifo: VecDeque::new(),
            pending_rx: None,
            complete_tx: true,
            crc_error: false,
            cad_detected: false,
            rx_timeouts: 0,
            fail_after_writes: None,
        }
    }

    pub fn reg(&self, address: u8) -> u8 {
        self.regs[address as usize]
    }

    pub fn writes_to(&self, address: u8) -> Vec<u8> {
        self.writes
            .iter()
            .filter(|(addr, _)| *addr == address)
            .map(|(_, value)| *value)
            .collect()
    }

    fn lora(&self) -> bool {
        self.reg(OP_MODE) & 0x80 != 0
    }

    fn failing(&self) -> bool {
        self.fail_after_writes
            .is_some_and(|limit| self.writes.len() >= limit)
    }

    fn enter_mode(&mut self, mode: u8) {
        let lora = self.lora();
        match mode {
            // TX
            3 if self.complete_tx => {
                if lora {
                    self.regs[LORA_IRQ as usize] |= 0x08;
                } else {
                    self.regs[FSK_IRQ_2 as usize] |= 0x08;
                }
            }
            // RX single, window closes early
            6 if lora && self.rx_timeouts > 0 => {
                self.rx_timeouts -= 1;
                self.regs[LORA_IRQ as usize] |= 0x80;
                self.regs[OP_MODE as usize] = (self.reg(OP_MODE) & !0x07) | 0x01;
            }
            // RX continuous / RX single
            5 | 6 => {
                if let Some(packet) = self.pending_rx.take() {
                    if lora {
                        self.regs[LORA_RX_NB_BYTES as usize] = packet.len() as u8;
                        self.regs[LORA_RX_CURRENT_ADDR as usize] = 0;
                        self.rx_fifo.extend(packet.iter().copied());
                        let crc = if self.crc_error { 0x20 } else { 0x00 };
                        self.regs[LORA_IRQ as usize] |= 0x40 | crc;
                    } else {
                        self.rx_fifo.push_back(packet.len() as u8);
                        self.rx_fifo.extend(packet.iter().copied());
                        self.regs[FSK_IRQ_2 as usize] |= 0x04;
                    }
                }
            }
            // CAD
            7 if lora => {
                let detected = if self.cad_detected { 0x01 } else { 0x00 };
                self.regs[LORA_IRQ as usize] |= 0x04 | detected;
            }
            _ => {}
        }
    }
}

impl RegisterTransport for MockTransport {
    type Error = BusFault;

    fn read_register(&mut self, address: u8) -> Result<u8, Self::Error> {
        if self.failing() {
            return Err(BusFault);
        }
        if address == FIFO_ADDRESS {
            return Ok(self.rx_fifo.pop_front().unwrap_or(0));
        }
        Ok(self.regs[(address & 0x7F) as usize])
    }

    fn write_register(&mut self, address: u8, value: u8) -> Result<(), Self::Error> {
        if self.failing() {
            return Err(BusFault);
        }
        self.writes.push((address, value));

        let lora = self.lora();
        match address {
            FIFO_ADDRESS => self.tx_fifo.push(value),
            LORA_IRQ if lora => self.regs[LORA_IRQ as usize] &= !value,
            FSK_IRQ_1 | FSK_IRQ_2 if !lora => self.regs[address as usize] &= !value,
            OP_MODE => {
                let previous = self.reg(OP_MODE);
                self.regs[OP_MODE as usize] = value;
                if previous & 0x07 != value & 0x07 {
                    self.enter_mode(value & 0x07);
                }
            }
            _ => self.regs[(address & 0x7F) as usize] = value,
        }
        Ok(())
    }
}
