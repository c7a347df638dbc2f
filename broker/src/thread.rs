use crate::{BrokerError, BrokerHost};
use log::debug;
use std::sync::Arc;
use std::thread::JoinHandle;
use sysbroker_ipc::IpcChannel;
use sysbroker_policy::BrokerPolicy;

/// Serves `ipc_channel` from a dedicated thread, until the client closes its
/// end of the channel.
pub fn spawn_broker_thread<P>(
    policy: Arc<P>,
    ipc_channel: IpcChannel,
    name: &str,
) -> Result<JoinHandle<()>, BrokerError>
where
    P: BrokerPolicy + Send + Sync + ?Sized + 'static,
{
    std::thread::Builder::new()
        .name(name.to_owned())
        .spawn(move || {
            debug!("Broker thread starting");
            BrokerHost::new(&*policy, ipc_channel).serve();
        })
        .map_err(|e| BrokerError::InternalOsOperationFailed {
            description: format!("cannot create broker thread: {}", e),
            os_code: e.raw_os_error().unwrap_or(0),
        })
}

/// Creates a durable channel served by a new broker thread, and returns the
/// end to hand to the sandboxed client.
pub fn spawn_broker<P>(policy: Arc<P>, name: &str) -> Result<(IpcChannel, JoinHandle<()>), BrokerError>
where
    P: BrokerPolicy + Send + Sync + ?Sized + 'static,
{
    let (client_channel, host_channel) = IpcChannel::new()?;
    let thread = spawn_broker_thread(policy, host_channel, name)?;
    Ok((client_channel, thread))
}
