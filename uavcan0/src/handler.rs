//! Uniform shape for inbound message and service handlers, registered with a
//! [`Node`](crate::Node) against a data type descriptor (§4.7, component 8).

use alloc::boxed::Box;
use alloc::rc::Rc;

use crate::dsdl::{CompoundValue, TypeDescriptor};
use crate::transfer::Transfer;
use crate::types::PortId;

/// Handles a completed broadcast or unicast message transfer. Implementors
/// typically just record the decoded value somewhere the application polls.
pub trait MessageHandler<C: embedded_time::Clock> {
    fn on_message(&mut self, value: &CompoundValue, transfer: &Transfer<C>);
}

/// Handles a completed service request and produces the response value that
/// gets packed and sent back automatically -- the handler never builds
/// frames itself.
pub trait ServiceHandler<C: embedded_time::Clock> {
    fn on_request(&mut self, request: &CompoundValue, transfer: &Transfer<C>) -> CompoundValue;
}

pub enum Handler<C: embedded_time::Clock> {
    Message(Box<dyn MessageHandler<C>>),
    Service(Box<dyn ServiceHandler<C>>),
}

/// One entry of the node's ordered handler registry: a data type descriptor
/// plus the handler it dispatches completed transfers of that type to.
pub struct HandlerRegistration<C: embedded_time::Clock> {
    pub data_type_id: PortId,
    pub ty: Rc<TypeDescriptor>,
    pub handler: Handler<C>,
}

impl<C: embedded_time::Clock> HandlerRegistration<C> {
    pub fn message(data_type_id: PortId, ty: Rc<TypeDescriptor>, handler: impl MessageHandler<C> + 'static) -> Self {
        Self {
            data_type_id,
            ty,
            handler: Handler::Message(Box::new(handler)),
        }
    }

    pub fn service(data_type_id: PortId, ty: Rc<TypeDescriptor>, handler: impl ServiceHandler<C> + 'static) -> Self {
        Self {
            data_type_id,
            ty,
            handler: Handler::Service(Box::new(handler)),
        }
    }

    pub fn is_service(&self) -> bool {
        matches!(self.handler, Handler::Service(_))
    }
}
