//! `portforward`: relays each connection to a fixed destination.

use std::io;
use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;
use clap::{value_parser, Arg, Command};
use tokio::net::TcpStream;

use crate::net::{ConnectionHandler, TcpService};
use crate::plugin::{PluginError, ServiceMaker, ServiceOptions};
use crate::service::Service;

const TAPNAME: &str = "portforward";

#[derive(Debug, Clone)]
pub struct ForwardHandler {
    dest_host: String,
    dest_port: u16,
}

impl ForwardHandler {
    pub fn new(dest_host: impl Into<String>, dest_port: u16) -> Self {
        Self {
            dest_host: dest_host.into(),
            dest_port,
        }
    }
}

#[async_trait]
impl ConnectionHandler for ForwardHandler {
    async fn handle(&self, mut inbound: TcpStream, peer: SocketAddr) -> io::Result<()> {
        let mut outbound = TcpStream::connect((self.dest_host.as_str(), self.dest_port)).await?;
        tracing::debug!(
            %peer,
            dest_host = %self.dest_host,
            dest_port = self.dest_port,
            "Forwarding connection"
        );

        let (to_dest, to_peer) = tokio::io::copy_bidirectional(&mut inbound, &mut outbound).await?;
        tracing::debug!(to_dest, to_peer, "Forwarded connection closed");
        Ok(())
    }
}

pub type PortForwardService = TcpService<ForwardHandler>;

#[derive(Debug, Clone, Copy, Default)]
pub struct PortForwardMaker;

impl ServiceMaker for PortForwardMaker {
    fn tapname(&self) -> &'static str {
        TAPNAME
    }

    fn description(&self) -> &'static str {
        "A simple TCP port forwarder"
    }

    fn options(&self) -> Command {
        Command::new(TAPNAME)
            .arg(
                Arg::new("port")
                    .long("port")
                    .short('p')
                    .value_parser(value_parser!(u16))
                    .default_value("6666")
                    .help("Port to listen on"),
            )
            .arg(
                Arg::new("interface")
                    .long("interface")
                    .value_parser(value_parser!(IpAddr))
                    .default_value("0.0.0.0")
                    .help("Interface to bind to"),
            )
            .arg(
                Arg::new("dest-host")
                    .long("dest-host")
                    .short('d')
                    .required(true)
                    .help("Host to forward connections to"),
            )
            .arg(
                Arg::new("dest-port")
                    .long("dest-port")
                    .value_parser(value_parser!(u16))
                    .required(true)
                    .help("Port to forward connections to"),
            )
            .arg(
                Arg::new("max-connections")
                    .long("max-connections")
                    .value_parser(value_parser!(usize))
                    .default_value("1024")
                    .help("Maximum number of concurrent connections"),
            )
    }

    fn make_service(&self, options: &ServiceOptions) -> Result<Box<dyn Service>, PluginError> {
        let port = options.parse_or(TAPNAME, "port", 6666u16)?;
        let interface = options.parse_or(TAPNAME, "interface", IpAddr::from([0, 0, 0, 0]))?;
        let dest_host = options.require(TAPNAME, "dest-host")?;
        let dest_port: u16 = options
            .require(TAPNAME, "dest-port")?
            .parse()
            .map_err(|e: std::num::ParseIntError| PluginError::InvalidOption {
                plugin: TAPNAME.to_string(),
                option: "dest-port".to_string(),
                message: e.to_string(),
            })?;
        let max_connections = options.parse_or(TAPNAME, "max-connections", 1024usize)?;

        Ok(Box::new(PortForwardService::new(
            TAPNAME,
            options.clone(),
            SocketAddr::new(interface, port),
            max_connections,
            ForwardHandler::new(dest_host, dest_port),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn destination_is_required() {
        let err = PortForwardMaker.make_service(&ServiceOptions::new()).unwrap_err();
        assert!(matches!(err, PluginError::MissingOption { ref option, .. } if option == "dest-host"));

        let parsed = PortForwardMaker.parse_args(&[]);
        assert!(matches!(parsed, Err(PluginError::Usage(_))));
    }

    #[tokio::test]
    async fn relays_to_destination() {
        let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let upstream_addr = upstream.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = upstream.accept().await.unwrap();
            let mut buf = [0u8; 5];
            socket.read_exact(&mut buf).await.unwrap();
            buf.reverse();
            socket.write_all(&buf).await.unwrap();
        });

        let mut service = PortForwardService::new(
            TAPNAME,
            ServiceOptions::new(),
            "127.0.0.1:0".parse().unwrap(),
            4,
            ForwardHandler::new("127.0.0.1", upstream_addr.port()),
        );
        service.start_service().await.unwrap();

        let mut client = TcpStream::connect(service.local_addr().unwrap()).await.unwrap();
        client.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"olleh");

        service.stop_service().await.unwrap();
    }
}
