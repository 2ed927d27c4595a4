//! `echo`: writes back whatever a client sends.

use std::io;
use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;
use clap::{value_parser, Arg, Command};
use tokio::net::TcpStream;

use crate::net::{ConnectionHandler, TcpService};
use crate::plugin::{PluginError, ServiceMaker, ServiceOptions};
use crate::service::Service;

const TAPNAME: &str = "echo";

#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

#[async_trait]
impl ConnectionHandler for EchoHandler {
    async fn handle(&self, mut stream: TcpStream, _peer: SocketAddr) -> io::Result<()> {
        let (mut reader, mut writer) = stream.split();
        let echoed = tokio::io::copy(&mut reader, &mut writer).await?;
        tracing::debug!(bytes = echoed, "Echo connection finished");
        Ok(())
    }
}

pub type EchoService = TcpService<EchoHandler>;

#[derive(Debug, Clone, Copy, Default)]
pub struct EchoMaker;

impl ServiceMaker for EchoMaker {
    fn tapname(&self) -> &'static str {
        TAPNAME
    }

    fn description(&self) -> &'static str {
        "A TCP echo server"
    }

    fn options(&self) -> Command {
        Command::new(TAPNAME)
            .arg(
                Arg::new("port")
                    .long("port")
                    .short('p')
                    .value_parser(value_parser!(u16))
                    .default_value("7007")
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
                Arg::new("max-connections")
                    .long("max-connections")
                    .value_parser(value_parser!(usize))
                    .default_value("1024")
                    .help("Maximum number of concurrent connections"),
            )
    }

    fn make_service(&self, options: &ServiceOptions) -> Result<Box<dyn Service>, PluginError> {
        let port = options.parse_or(TAPNAME, "port", 7007u16)?;
        let interface = options.parse_or(TAPNAME, "interface", IpAddr::from([0, 0, 0, 0]))?;
        let max_connections = options.parse_or(TAPNAME, "max-connections", 1024usize)?;

        Ok(Box::new(EchoService::new(
            TAPNAME,
            options.clone(),
            SocketAddr::new(interface, port),
            max_connections,
            EchoHandler,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn loopback_options() -> ServiceOptions {
        ServiceOptions::new()
            .with("port", "0")
            .with("interface", "127.0.0.1")
    }

    #[test]
    fn parse_args_fills_defaults() {
        let options = EchoMaker.parse_args(&["--port".to_string(), "9999".to_string()]).unwrap();
        assert_eq!(options.get("port"), Some("9999"));
        assert_eq!(options.get("interface"), Some("0.0.0.0"));
        assert_eq!(options.get("max-connections"), Some("1024"));
    }

    #[test]
    fn parse_args_rejects_bad_port() {
        let err = EchoMaker.parse_args(&["--port".to_string(), "seventy".to_string()]);
        assert!(matches!(err, Err(PluginError::Usage(_))));
    }

    #[tokio::test]
    async fn echoes_bytes_until_stopped() {
        let mut service = EchoService::new(
            TAPNAME,
            loopback_options(),
            "127.0.0.1:0".parse().unwrap(),
            4,
            EchoHandler,
        );
        service.start_service().await.unwrap();
        let addr = service.local_addr().unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        service.stop_service().await.unwrap();
        assert!(!service.is_running());
        assert_eq!(service.active_connections(), 0);
    }

    #[test]
    fn descriptor_keeps_options_verbatim() {
        let service = EchoMaker.make_service(&loopback_options()).unwrap();
        let descriptor = service.descriptor();
        assert_eq!(descriptor.maker, "echo");
        assert_eq!(descriptor.name, "echo");
        assert_eq!(descriptor.options, loopback_options());
    }
}
