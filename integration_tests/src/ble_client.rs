//! BLE client acting as a Hublink collector.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::time::timeout;
use uuid::Uuid;

use crate::protocol::{parse_catalog, CatalogEntry, Reassembler};

/// Hublink service and characteristic UUIDs
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x57617368_5501_0001_8000_00805f9b34fb);
const FILENAME_UUID: Uuid = Uuid::from_u128(0x57617368_5502_0001_8000_00805f9b34fb); // Catalog out, request in
const FILETRANSFER_UUID: Uuid = Uuid::from_u128(0x57617368_5503_0001_8000_00805f9b34fb); // File content out

/// Fragments received on one characteristic, in arrival order
type FragmentQueue = Arc<Mutex<VecDeque<Vec<u8>>>>;

/// BLE client for a single Hublink node.
pub struct HublinkClient {
    peripheral: Peripheral,
    filename_char: Characteristic,
    transfer_char: Characteristic,
    catalog_fragments: FragmentQueue,
    transfer_fragments: FragmentQueue,
}

impl HublinkClient {
    /// Scan for a node whose advertised name starts with `name` and connect.
    ///
    /// The notification stream is opened before subscribing so no fragment is
    /// missed. The node starts its catalog once the filename characteristic is
    /// subscribed, so the transfer characteristic is subscribed second and
    /// only matters for file content.
    pub async fn connect_by_name(name: &str, scan_timeout: Duration) -> Result<Self> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;
        let adapter = adapters
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No Bluetooth adapters found"))?;

        adapter.start_scan(ScanFilter::default()).await?;
        let peripheral = Self::find_device_by_name(&adapter, name, scan_timeout).await?;
        adapter.stop_scan().await?;

        peripheral.connect().await?;
        peripheral.discover_services().await?;

        let characteristics = peripheral.characteristics();

        let filename_char = characteristics
            .iter()
            .find(|c| c.uuid == FILENAME_UUID)
            .cloned()
            .ok_or_else(|| anyhow!("Filename characteristic not found"))?;

        let transfer_char = characteristics
            .iter()
            .find(|c| c.uuid == FILETRANSFER_UUID)
            .cloned()
            .ok_or_else(|| anyhow!("File transfer characteristic not found"))?;

        let catalog_fragments: FragmentQueue = Arc::new(Mutex::new(VecDeque::new()));
        let transfer_fragments: FragmentQueue = Arc::new(Mutex::new(VecDeque::new()));

        // Route indications to their queue by characteristic
        let mut stream = peripheral.notifications().await?;
        let catalog_clone = catalog_fragments.clone();
        let transfer_clone = transfer_fragments.clone();
        tokio::spawn(async move {
            while let Some(data) = stream.next().await {
                let queue = if data.uuid == FILENAME_UUID {
                    &catalog_clone
                } else if data.uuid == FILETRANSFER_UUID {
                    &transfer_clone
                } else {
                    continue;
                };
                queue.lock().await.push_back(data.value);
            }
        });

        peripheral.subscribe(&filename_char).await?;
        peripheral.subscribe(&transfer_char).await?;

        Ok(Self {
            peripheral,
            filename_char,
            transfer_char,
            catalog_fragments,
            transfer_fragments,
        })
    }

    /// Find a device by name prefix within the scan timeout.
    async fn find_device_by_name(
        adapter: &Adapter,
        name: &str,
        scan_timeout: Duration,
    ) -> Result<Peripheral> {
        let start = std::time::Instant::now();

        while start.elapsed() < scan_timeout {
            let peripherals = adapter.peripherals().await?;

            for peripheral in peripherals {
                if let Some(props) = peripheral.properties().await? {
                    if let Some(local_name) = props.local_name {
                        if local_name.starts_with(name) {
                            return Ok(peripheral);
                        }
                    }
                }
            }

            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        Err(anyhow!("No device matching '{}' found within timeout", name))
    }

    /// Advertised name of the connected node, if known.
    pub async fn local_name(&self) -> Result<Option<String>> {
        Ok(self
            .peripheral
            .properties()
            .await?
            .and_then(|props| props.local_name))
    }

    /// Collect catalog fragments until the end marker.
    pub async fn read_catalog_raw(&self, response_timeout: Duration) -> Result<Reassembler> {
        Self::collect(&self.catalog_fragments, response_timeout).await
    }

    /// Collect and parse the catalog sent after subscribing.
    pub async fn read_catalog(&self, response_timeout: Duration) -> Result<Vec<CatalogEntry>> {
        let catalog = self.read_catalog_raw(response_timeout).await?;
        parse_catalog(catalog.data())
    }

    /// Write a filename request without waiting for the content.
    pub async fn send_request(&self, name: &str) -> Result<()> {
        self.peripheral
            .write(&self.filename_char, name.as_bytes(), WriteType::WithResponse)
            .await?;
        Ok(())
    }

    /// Request a file and collect its content until the end marker.
    pub async fn request_file(&self, name: &str, response_timeout: Duration) -> Result<Reassembler> {
        self.clear_transfer().await;
        self.send_request(name).await?;
        Self::collect(&self.transfer_fragments, response_timeout).await
    }

    /// Wait for any fragment on the transfer characteristic.
    ///
    /// Returns `None` if nothing arrives within the timeout.
    pub async fn try_read_transfer(&self, timeout_duration: Duration) -> Option<Vec<u8>> {
        timeout(timeout_duration, async {
            loop {
                if let Some(fragment) = self.transfer_fragments.lock().await.pop_front() {
                    return fragment;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .ok()
    }

    async fn collect(queue: &FragmentQueue, response_timeout: Duration) -> Result<Reassembler> {
        let result = timeout(response_timeout, async {
            let mut reassembler = Reassembler::new();
            loop {
                let fragment = queue.lock().await.pop_front();
                match fragment {
                    Some(fragment) => {
                        if reassembler.push(&fragment) {
                            return reassembler;
                        }
                    }
                    None => tokio::time::sleep(Duration::from_millis(10)).await,
                }
            }
        })
        .await;

        result.map_err(|_| anyhow!("Timeout waiting for end of data"))
    }

    /// Whether the link is still up (the node drops idle peers).
    pub async fn is_connected(&self) -> Result<bool> {
        Ok(self.peripheral.is_connected().await?)
    }

    /// Clear any fragments queued on the transfer characteristic.
    pub async fn clear_transfer(&self) {
        self.transfer_fragments.lock().await.clear();
    }

    /// Disconnect from the node.
    pub async fn disconnect(&self) -> Result<()> {
        if self.peripheral.is_connected().await? {
            self.peripheral.disconnect().await?;
        }
        Ok(())
    }
}
