// One persistent transport per configured service.

use std::collections::HashMap;

use anyhow::{Context, Result};
use tonic::transport::Channel;

use crate::config::services::{Service, Services};
use crate::error::user_error;
use crate::grpc::tls::build_client_tls;

/// Eagerly created channels keyed by service short name. Channels clone
/// cheaply; the underlying HTTP/2 connection is shared.
#[derive(Debug)]
pub struct ChannelPool {
    channels: HashMap<String, Channel>,
}

impl ChannelPool {
    pub fn connect(services: &Services) -> Result<Self> {
        let mut channels = HashMap::with_capacity(services.len());
        for (name, service) in services {
            let channel = create_channel(service)
                .with_context(|| format!("error creating connection for service {name}"))?;
            channels.insert(name.clone(), channel);
        }
        Ok(Self { channels })
    }

    pub fn get(&self, service_name: &str) -> Option<Channel> {
        self.channels.get(service_name).cloned()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

fn create_channel(service: &Service) -> Result<Channel> {
    if service.address.is_empty() {
        return Err(user_error("service address cannot be empty".to_string()));
    }
    if !service.address.contains(':') {
        return Err(user_error(format!(
            "invalid address '{}', expected host:port or scheme://host:port",
            service.address
        )));
    }

    let scheme = if service.tls.is_some() { "https" } else { "http" };
    let addr = if service.address.contains("://") {
        service.address.clone()
    } else {
        format!("{scheme}://{}", service.address)
    };

    let mut endpoint = Channel::from_shared(addr)
        .map_err(|_| user_error(format!("invalid address format '{}'", service.address)))?
        .user_agent(user_agent_value())
        .context("invalid user-agent value")?;

    if let Some(settings) = &service.tls {
        endpoint = endpoint
            .tls_config(build_client_tls(settings)?)
            .context("failed to configure TLS")?;
    }

    // connect_lazy: the channel object exists now, the HTTP/2 connection is
    // established on first use and re-established after transient failures.
    Ok(endpoint.connect_lazy())
}

fn user_agent_value() -> String {
    format!("grpcsuite/{}", env!("CARGO_PKG_VERSION"))
}
