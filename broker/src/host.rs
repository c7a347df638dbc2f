use crate::brokered_syscalls::{
    access_file, open_file, readlink_file, rename_file, stat64_file, stat_file, Response,
};
use libc::{ECONNRESET, ENOMEM, MSG_CMSG_CLOEXEC};
use log::{debug, warn};
use sysbroker_ipc::{IpcChannel, Message};
use sysbroker_ipc_messages::{Reply, Request};
use sysbroker_policy::BrokerPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Success,
    /// The request could not be served. No reply may have been sent, in which
    /// case the client sees its reply channel closed.
    Failure,
    /// The durable channel is gone, nothing more will be received.
    LostClient,
}

/// Serves requests received on one durable channel, one at a time.
///
/// Several hosts can share a policy and serve different channels (or even
/// the same one) concurrently.
pub struct BrokerHost<'a, P: BrokerPolicy + ?Sized> {
    policy: &'a P,
    ipc_channel: IpcChannel,
}

impl<'a, P: BrokerPolicy + ?Sized> BrokerHost<'a, P> {
    pub fn new(policy: &'a P, ipc_channel: IpcChannel) -> Self {
        Self {
            policy,
            ipc_channel,
        }
    }

    pub fn ipc_channel(&self) -> &IpcChannel {
        &self.ipc_channel
    }

    /// Serves requests until the client goes away.
    pub fn serve(&self) {
        while self.handle_request() != RequestStatus::LostClient {}
        debug!("Broker host exiting cleanly, client closed its IPC channel");
    }

    /// Blocks until one request is received, then serves it.
    pub fn handle_request(&self) -> RequestStatus {
        // Reply channels, and nothing else, are received here.
        let (message, reply_handle) = match self.ipc_channel.recv(MSG_CMSG_CLOEXEC) {
            Ok(Some(received)) => received,
            Ok(None) => return RequestStatus::LostClient,
            Err(e) if e.os_code() == Some(ECONNRESET) => return RequestStatus::LostClient,
            Err(e) => {
                warn!("Unable to receive request from client: {:?}", e);
                return RequestStatus::Failure;
            }
        };
        let reply_channel = match reply_handle {
            Some(handle) => IpcChannel::from_handle(handle),
            None => {
                warn!("Received request without a reply channel");
                return RequestStatus::Failure;
            }
        };
        let request = match Request::read_from(&message) {
            Ok(request) => request,
            Err(e) => {
                warn!("Malformed request from client: {:?}", e);
                return RequestStatus::Failure;
            }
        };
        debug!("Received request: {}", request);

        let response = self.dispatch(&request);
        let mut reply_message = Message::new();
        let reply = match &response.payload {
            Some(payload) => Reply::with_payload(response.result, payload),
            None => Reply::code(response.result),
        };
        if let Err(e) = reply.write_to(&mut reply_message) {
            warn!("Unable to encode reply to {}: {:?}", request, e);
            reply_message = Message::new();
            if Reply::code(-ENOMEM).write_to(&mut reply_message).is_err() {
                return RequestStatus::Failure;
            }
            // Whatever was opened is closed when `response` is dropped
            let _ = reply_channel.send(&reply_message, None);
            return RequestStatus::Failure;
        }
        debug!(
            "Sending reply: {} (handle={:?})",
            response.result, &response.handle
        );
        // Our copy of any file descriptor is closed once `response` goes out
        // of scope, whether the client got it or not.
        match reply_channel.send(&reply_message, response.handle.as_ref()) {
            Ok(()) => RequestStatus::Success,
            Err(e) => {
                warn!("Unable to send reply to {}: {:?}", request, e);
                RequestStatus::Failure
            }
        }
    }

    fn dispatch(&self, request: &Request) -> Response {
        match *request {
            Request::Open { path, flags } => open_file(self.policy, path, flags),
            Request::Access { path, mode } => access_file(self.policy, path, mode),
            Request::Stat { path, follow_links } => stat_file(self.policy, path, follow_links),
            Request::Stat64 { path, follow_links } => stat64_file(self.policy, path, follow_links),
            Request::Rename { old_path, new_path } => rename_file(self.policy, old_path, new_path),
            Request::Readlink { path } => readlink_file(self.policy, path),
        }
    }
}
