use futures::StreamExt;
use k8s_openapi::api::core::v1::{Endpoints, Secret, Service};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client};
use lb_api::{Gateway, GatewayClass, HTTPRoute};
use lb_core::{Controller, Resource, WatchEvent};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tokio::sync::watch as signal;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Start one watch stream per resource kind
pub fn spawn_all(tasks: &mut JoinSet<()>, client: &Client, controller: &Controller, stop: &signal::Receiver<bool>) {
    tasks.spawn(run(Api::<GatewayClass>::all(client.clone()), controller.clone(), stop.clone()));
    tasks.spawn(run(Api::<Gateway>::all(client.clone()), controller.clone(), stop.clone()));
    tasks.spawn(run(Api::<HTTPRoute>::all(client.clone()), controller.clone(), stop.clone()));
    tasks.spawn(run(Api::<Service>::all(client.clone()), controller.clone(), stop.clone()));
    tasks.spawn(run(Api::<Endpoints>::all(client.clone()), controller.clone(), stop.clone()));
    tasks.spawn(run(Api::<Secret>::all(client.clone()), controller.clone(), stop.clone()));
}

/// Feed every change of one kind into the controller until `stop` fires.
///
/// The initial listing is replayed as applies; the controller drops the
/// ones its ledger has already seen.
async fn run<K>(api: Api<K>, controller: Controller, mut stop: signal::Receiver<bool>)
where
    K: kube::Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Default,
    Resource: From<K>,
{
    let kind = K::kind(&K::DynamicType::default()).to_string();
    let mut stream = watcher(api, watcher::Config::default()).default_backoff().boxed();
    info!("Watching {}", kind);

    loop {
        tokio::select! {
            event = stream.next() => match event {
                Some(Ok(event)) => handle(&controller, event).await,
                Some(Err(error)) => warn!(%error, "{} watch disconnected", kind),
                None => break,
            },
            _ = stop.changed() => break,
        }
    }
    debug!("Stopped watching {}", kind);
}

async fn handle<K>(controller: &Controller, event: watcher::Event<K>)
where
    Resource: From<K>,
{
    match event {
        watcher::Event::Apply(obj) | watcher::Event::InitApply(obj) => {
            controller.handle_event(WatchEvent::applied(obj)).await
        }
        watcher::Event::Delete(obj) => {
            let key = Resource::from(obj).key();
            controller.handle_event(WatchEvent::deleted(key)).await
        }
        watcher::Event::Init | watcher::Event::InitDone => {}
    }
}
