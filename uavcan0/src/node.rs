//! Send primitives, the receive/dispatch pipeline, and response correlation
//! for a single UAVCAN node, per §4.7.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::vec::Vec;

use crate::bits::{self, BitVec};
use crate::dsdl::descriptor::ServiceMode;
use crate::dsdl::{TypeDescriptor, Value};
use crate::handler::{Handler, HandlerRegistration};
use crate::time::Timestamp;
use crate::transfer::manager::timestamp_expired;
use crate::transfer::{Transfer, TransferManager};
use crate::transport::can::Frame;
use crate::types::{DataTypeSignature, NodeId, PortId, TransferId, TransferPriority};
use crate::{RxError, TxError};

type ResponseCallback<C> = Box<dyn FnOnce(Value, Transfer<C>)>;

struct OutstandingRequest<C: embedded_time::Clock> {
    request: Transfer<C>,
    ty: Rc<TypeDescriptor>,
    callback: ResponseCallback<C>,
    sent_at: Timestamp<C>,
}

/// Well-known data-type id for `uavcan.protocol.NodeStatus`. The peer-status
/// cache keys off this directly rather than off the handler registry, since
/// it must populate whether or not the embedder has registered a handler
/// for the type (mirroring the original's unconditional cache update in
/// `_recv_frame`, ahead of handler dispatch).
pub const NODE_STATUS_DATA_TYPE_ID: PortId = 341;

/// The fields of a `NodeStatus` broadcast worth remembering about a peer,
/// plus the local receive timestamp. Feeds node-discovery logic (timeout
/// detection, `GetNodeInfo` on uptime regression) that the embedder builds
/// on top; this crate only maintains the cache.
#[derive(Copy, Clone, Debug)]
pub struct PeerStatus<C: embedded_time::Clock> {
    pub uptime_sec: u32,
    pub health: u8,
    pub mode: u8,
    pub sub_mode: u8,
    pub vendor_specific_status_code: u16,
    pub timestamp: Timestamp<C>,
}

/// Reads `n` bits off the front of `stream` as a big-endian unsigned value,
/// undoing the little-endian-ish bit order fields are packed in on the wire.
fn take_be_uint(stream: &mut BitVec, n: usize) -> u64 {
    bits::be_from_le_bits(&stream.take(n), n).to_uint()
}

/// A single UAVCAN node: owns the transfer-reassembly state, the outbound
/// transfer-id counters, the handler registry, and any requests awaiting a
/// response.
pub struct Node<C: embedded_time::Clock> {
    node_id: Option<NodeId>,
    transfer_manager: TransferManager<C>,
    next_transfer_ids: BTreeMap<(PortId, Option<NodeId>), TransferId>,
    outstanding_requests: Vec<OutstandingRequest<C>>,
    handler_registry: Vec<HandlerRegistration<C>>,
    tx_queue: Vec<Frame<C>>,
    status_code: u8,
    node_info: BTreeMap<NodeId, PeerStatus<C>>,
}

impl<C: embedded_time::Clock> Node<C> {
    pub fn new(node_id: Option<NodeId>) -> Self {
        Self {
            node_id,
            transfer_manager: TransferManager::new(),
            next_transfer_ids: BTreeMap::new(),
            outstanding_requests: Vec::new(),
            handler_registry: Vec::new(),
            tx_queue: Vec::new(),
            status_code: 0,
            node_info: BTreeMap::new(),
        }
    }

    pub fn node_id(&self) -> Option<NodeId> {
        self.node_id
    }

    /// The peer-status cache populated by received `NodeStatus` broadcasts,
    /// keyed by source node id.
    pub fn node_info(&self) -> &BTreeMap<NodeId, PeerStatus<C>> {
        &self.node_info
    }

    /// Decodes a `NodeStatus` payload directly (bypassing the handler
    /// registry and the multi-frame CRC path, since the type is a fixed,
    /// single-frame 7-byte layout) and records it in the cache.
    fn cache_node_status(&mut self, source: NodeId, payload: &[u8], now: Timestamp<C>) {
        let mut stream = bits::bits_from_bytes(payload);
        if stream.len() < 56 {
            return;
        }
        let uptime_sec = take_be_uint(&mut stream, 32) as u32;
        let health = take_be_uint(&mut stream, 2) as u8;
        let mode = take_be_uint(&mut stream, 3) as u8;
        let sub_mode = take_be_uint(&mut stream, 3) as u8;
        let vendor_specific_status_code = take_be_uint(&mut stream, 16) as u16;
        self.node_info.insert(
            source,
            PeerStatus {
                uptime_sec,
                health,
                mode,
                sub_mode,
                vendor_specific_status_code,
                timestamp: now,
            },
        );
    }

    pub fn register(&mut self, registration: HandlerRegistration<C>) {
        self.handler_registry.push(registration);
    }

    /// Drains frames queued by `send_*`/dispatch for the driver to put on
    /// the bus. Frames of one transfer were pushed contiguously and in
    /// `frame_index` order; callers must preserve that order.
    pub fn drain_tx(&mut self) -> Vec<Frame<C>> {
        core::mem::take(&mut self.tx_queue)
    }

    pub fn remove_inactive_transfers<D>(&mut self, now: Timestamp<C>, timeout: D)
    where
        D: embedded_time::duration::Duration + embedded_time::fixed_point::FixedPoint + Copy,
        <C as embedded_time::Clock>::T: From<<D as embedded_time::fixed_point::FixedPoint>::T>,
    {
        self.transfer_manager.remove_inactive_transfers(now, timeout);
    }

    /// The core never auto-cancels a sent request (§5); this lets the
    /// embedder apply its own timeout policy, dropping and returning the
    /// requests that have been outstanding for longer than `timeout`.
    pub fn expire_outstanding_requests<D>(&mut self, now: Timestamp<C>, timeout: D) -> Vec<Transfer<C>>
    where
        D: embedded_time::duration::Duration + embedded_time::fixed_point::FixedPoint + Copy,
        <C as embedded_time::Clock>::T: From<<D as embedded_time::fixed_point::FixedPoint>::T>,
    {
        let mut expired = Vec::new();
        self.outstanding_requests.retain(|pending| {
            if timestamp_expired(timeout, now, Some(pending.sent_at)) {
                expired.push(pending.request.clone());
                false
            } else {
                true
            }
        });
        expired
    }

    fn next_transfer_id(&mut self, data_type_id: PortId, dest: Option<NodeId>) -> TransferId {
        let id = self
            .next_transfer_ids
            .entry((data_type_id, dest))
            .or_insert(0);
        let current = *id;
        *id = (current + 1) % 8;
        current
    }

    fn queue(&mut self, transfer: &Transfer<C>) -> Result<(), TxError> {
        self.tx_queue.extend(transfer.to_frames()?);
        Ok(())
    }

    /// Broadcasts `value` as a NORMAL-priority message with no destination.
    pub fn send_broadcast(
        &mut self,
        value: &Value,
        data_type_id: PortId,
        data_type_signature: DataTypeSignature,
        now: Timestamp<C>,
    ) -> Result<(), TxError> {
        let source_node_id = self.node_id.unwrap_or(0);
        let transfer_id = self.next_transfer_id(data_type_id, None);
        let transfer = Transfer {
            transfer_id,
            source_node_id,
            dest_node_id: None,
            data_type_id,
            transfer_priority: TransferPriority::Normal,
            request_not_response: false,
            broadcast_not_unicast: true,
            payload: value.pack_bytes(),
            data_type_signature,
            timestamp: now,
        };
        self.queue(&transfer)
    }

    /// Sends `value` as a NORMAL-priority message addressed to `dest`.
    pub fn send_unicast(
        &mut self,
        value: &Value,
        data_type_id: PortId,
        data_type_signature: DataTypeSignature,
        dest: NodeId,
        now: Timestamp<C>,
    ) -> Result<(), TxError> {
        let source_node_id = self.node_id.unwrap_or(0);
        let transfer_id = self.next_transfer_id(data_type_id, Some(dest));
        let transfer = Transfer {
            transfer_id,
            source_node_id,
            dest_node_id: Some(dest),
            data_type_id,
            transfer_priority: TransferPriority::Normal,
            request_not_response: false,
            broadcast_not_unicast: false,
            payload: value.pack_bytes(),
            data_type_signature,
            timestamp: now,
        };
        self.queue(&transfer)
    }

    /// Sends a SERVICE request to `dest`, recording `callback` to be invoked
    /// exactly once when (or if) a matching response is dispatched. `ty` is
    /// the same compound descriptor `value` was built from -- kept around so
    /// the eventual response can be unpacked against its response-side
    /// fields, since the response carries no type information of its own.
    pub fn send_request(
        &mut self,
        value: &Value,
        ty: Rc<TypeDescriptor>,
        data_type_id: PortId,
        data_type_signature: DataTypeSignature,
        dest: NodeId,
        now: Timestamp<C>,
        callback: impl FnOnce(Value, Transfer<C>) + 'static,
    ) -> Result<(), TxError> {
        let source_node_id = self.node_id.ok_or(TxError::ServiceNoSourceId)?;
        let transfer_id = self.next_transfer_id(data_type_id, Some(dest));
        let transfer = Transfer {
            transfer_id,
            source_node_id,
            dest_node_id: Some(dest),
            data_type_id,
            transfer_priority: TransferPriority::Service,
            request_not_response: true,
            broadcast_not_unicast: false,
            payload: value.pack_bytes(),
            data_type_signature,
            timestamp: now,
        };
        self.queue(&transfer)?;
        self.outstanding_requests.push(OutstandingRequest {
            request: transfer,
            ty,
            callback: Box::new(callback),
            sent_at: now,
        });
        Ok(())
    }

    fn find_registration(&mut self, data_type_id: PortId, is_service: bool) -> Option<usize> {
        self.handler_registry
            .iter()
            .position(|r| r.data_type_id == data_type_id && r.is_service() == is_service)
    }

    /// Feeds one raw extended CAN frame through reassembly and, once a
    /// transfer completes, dispatch. Non-extended frames must be filtered
    /// out by the caller before this is reached.
    pub fn receive_frame(&mut self, raw_id: u32, data: &[u8], now: Timestamp<C>) -> Result<(), RxError> {
        let frame = Frame::from_can(now, raw_id, data)?;

        // Targeted frames (unicast/service) not addressed to us are still
        // buffered by the transfer manager like any other key, but we only
        // dispatch once complete, and only if they're ours or broadcast.
        let Some(frames) = self.transfer_manager.receive_frame(frame) else {
            return Ok(());
        };

        let first = &frames[0];
        let data_type_id = first.data_type_id();
        let is_service = first.transfer_priority().is_service();
        let is_request = is_service && first.request_not_response();
        let is_response = is_service && !is_request;

        if !is_service && data_type_id == NODE_STATUS_DATA_TYPE_ID && frames.len() == 1 {
            self.cache_node_status(first.source_node_id(), first.payload(), now);
        }

        if is_response {
            return self.dispatch_response(&frames, data_type_id, now);
        }

        let addressed_to_us = match first.dest_node_id() {
            None => true,
            Some(dest) => Some(dest) == self.node_id,
        };
        if !addressed_to_us {
            return Ok(());
        }

        let Some(index) = self.find_registration(data_type_id, is_request) else {
            return Err(RxError::UnknownDtid);
        };

        let signature = match &*self.handler_registry[index].ty {
            TypeDescriptor::Compound(c) => c.data_type_signature,
            _ => return Err(RxError::UnknownDtid),
        };

        let transfer = Transfer::from_frames(&frames, signature)?;

        let ty = self.handler_registry[index].ty.clone();
        let mut value = if is_request {
            Value::new_service(&ty, ServiceMode::Request, true)
                .map_err(|_| RxError::TransferMalformed)?
        } else {
            Value::new_default(&ty, true).map_err(|_| RxError::TransferMalformed)?
        };
        value
            .unpack_bytes(&transfer.payload)
            .map_err(|_| RxError::TransferMalformed)?;

        match &mut self.handler_registry[index].handler {
            Handler::Message(handler) => {
                handler.on_message(value.as_compound().unwrap(), &transfer);
                Ok(())
            }
            Handler::Service(handler) => {
                let response = handler.on_request(value.as_compound().unwrap(), &transfer);
                self.send_response(response, &transfer, signature)
                    .map_err(|_| RxError::TransferMalformed)
            }
        }
    }

    fn send_response(
        &mut self,
        response: crate::dsdl::CompoundValue,
        request: &Transfer<C>,
        data_type_signature: DataTypeSignature,
    ) -> Result<(), TxError> {
        let payload = Value::Compound(response).pack_bytes();

        let reply = Transfer {
            transfer_id: request.transfer_id,
            source_node_id: self.node_id.ok_or(TxError::ServiceNoSourceId)?,
            dest_node_id: Some(request.source_node_id),
            data_type_id: request.data_type_id,
            transfer_priority: TransferPriority::Service,
            request_not_response: false,
            broadcast_not_unicast: false,
            payload,
            data_type_signature,
            timestamp: request.timestamp,
        };
        self.queue(&reply)
    }

    fn dispatch_response(
        &mut self,
        frames: &[Frame<C>],
        data_type_id: PortId,
        _now: Timestamp<C>,
    ) -> Result<(), RxError> {
        let first = &frames[0];
        let resp_source = first.source_node_id();
        let resp_dest = first.dest_node_id();

        let position = self.outstanding_requests.iter().position(|pending| {
            pending.request.data_type_id == data_type_id
                && Some(resp_source) == pending.request.dest_node_id
                && resp_dest == Some(pending.request.source_node_id)
        });

        let Some(position) = position else {
            return Err(RxError::UnknownDtid);
        };

        let pending = self.outstanding_requests.remove(position);
        let signature = pending.request.data_type_signature;
        let transfer = Transfer::from_frames(frames, signature)?;

        let mut value = Value::new_service(&pending.ty, ServiceMode::Response, true)
            .map_err(|_| RxError::TransferMalformed)?;
        value
            .unpack_bytes(&transfer.payload)
            .map_err(|_| RxError::TransferMalformed)?;

        (pending.callback)(value, transfer);
        Ok(())
    }

    pub fn set_status_code(&mut self, status_code: u8) {
        self.status_code = status_code;
    }

    /// Broadcasts a `NodeStatus`-shaped message: `uptime_sec` (as supplied
    /// by the caller, since the embedder already owns the clock driving its
    /// periodic timer), `health` (top 2 bits of `status_code`), `mode` (low
    /// 3 bits), and `vendor_specific_status_code = 0`. The type descriptor
    /// and dtid come from the caller since the DSDL parser is out of scope
    /// here; this is meant to be invoked by a 500ms timer the embedder owns.
    pub fn heartbeat(
        &mut self,
        now: Timestamp<C>,
        uptime_sec: u32,
        node_status_ty: &Rc<TypeDescriptor>,
        data_type_id: PortId,
        data_type_signature: DataTypeSignature,
    ) -> Result<(), TxError> {
        let mut value =
            Value::new_default(node_status_ty, true).map_err(|_| TxError::PayloadTooLarge)?;
        let compound = value.as_compound_mut().ok_or(TxError::PayloadTooLarge)?;
        let _ = compound.set_numeric("uptime_sec", uptime_sec as f64);
        let _ = compound.set_numeric("health", ((self.status_code >> 6) & 0x3) as f64);
        let _ = compound.set_numeric("mode", (self.status_code & 0x7) as f64);
        let _ = compound.set_numeric("sub_mode", 0.0);
        let _ = compound.set_numeric("vendor_specific_status_code", 0.0);

        self.send_broadcast(&value, data_type_id, data_type_signature, now)
    }
}
