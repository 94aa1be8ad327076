#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::net::{Ipv4Addr, TcpListener, UdpSocket};
use std::sync::Mutex;

use satchel_core::codec::dates::Timestamp;
use satchel_core::transfer::progress::TransferObserver;
use satchel_core::{Product, SaleRecord, Snapshot, VoiceNote};

pub fn ts(secs: i64) -> Timestamp {
    Timestamp::from_unix(secs).unwrap()
}

pub fn product(id: i64, image: Option<&str>) -> Product {
    Product {
        id,
        name: format!("Product {id}"),
        price: 12.75,
        quantity: 4,
        image_path: image.map(str::to_string),
        created_at: ts(1_700_000_000 + id),
    }
}

pub fn sale(id: i64, product_id: i64, image: Option<&str>) -> SaleRecord {
    SaleRecord {
        id,
        product_id: Some(product_id),
        product_name: format!("Product {product_id}"),
        quantity: 2,
        unit_price: 12.75,
        total: 25.5,
        image_path: image.map(str::to_string),
        note: Some("cash".into()),
        sold_at: ts(1_700_100_000 + id),
    }
}

pub fn voice(id: i64, path: &str) -> VoiceNote {
    VoiceNote {
        id,
        title: format!("memo {id}"),
        file_path: path.to_string(),
        duration_ms: 4_200,
        created_at: ts(1_700_200_000 + id),
    }
}

pub fn sample_snapshot() -> Snapshot {
    Snapshot {
        products: vec![
            product(1, Some("images/p1.jpg")),
            product(2, Some("images/gone.jpg")),
        ],
        sales: vec![sale(10, 1, None)],
        voice_notes: vec![voice(20, "voices/memo.m4a")],
    }
}

/// Hand-built archive with exactly the given entries.
pub fn zip_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut cur = Cursor::new(Vec::new());
    {
        let mut z = zip::ZipWriter::new(&mut cur);
        for (name, bytes) in entries {
            z.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            z.write_all(bytes).unwrap();
        }
        z.finish().unwrap();
    }
    cur.into_inner()
}

/// Deterministic, poorly compressible bytes.
pub fn noise(len: usize, seed: u32) -> Vec<u8> {
    let mut x = seed | 1;
    (0..len)
        .map(|_| {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            x as u8
        })
        .collect()
}

pub fn free_tcp_port() -> u16 {
    TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

pub fn free_udp_port() -> u16 {
    UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Progress(u64, u64),
    Warnings(usize),
    Complete(bool, String),
}

#[derive(Default)]
pub struct Recorder {
    pub events: Mutex<Vec<Event>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn completions(&self) -> Vec<(bool, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Complete(ok, msg) => Some((ok, msg)),
                _ => None,
            })
            .collect()
    }

    pub fn progress(&self) -> Vec<(u64, u64)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Progress(p, t) => Some((p, t)),
                _ => None,
            })
            .collect()
    }
}

impl TransferObserver for Recorder {
    fn on_progress(&self, processed: u64, total: u64) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Progress(processed, total));
    }

    fn on_complete(&self, success: bool, message: &str) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Complete(success, message.to_string()));
    }

    fn on_warnings(&self, warnings: &[satchel_core::ArchiveWarning]) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Warnings(warnings.len()));
    }
}
