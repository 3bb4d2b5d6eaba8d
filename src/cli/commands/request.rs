use std::process::ExitCode;

use console::style;
use serde_json::{json, Value};

use crate::client::{ClientFactory, ConnectionDescriptor, TransportKind};
use crate::config::AppConfig;
use crate::dispatch::{
    ActionRequest, ConnectRequest, Dispatcher, ExecuteReply, ExecuteRequest, InfoRequest, Reply,
};
use crate::error::{FerryError, Result};

pub async fn connect<F: ClientFactory>(
    config: &AppConfig,
    dispatcher: &Dispatcher<F>,
    conn: &str,
    setup: bool,
    data: Option<String>,
) -> Result<ExitCode> {
    let mut data = parse_data(data)?;
    if setup {
        match &mut data {
            Some(Value::Object(map)) => {
                map.insert("setup".to_string(), Value::Bool(true));
            }
            None | Some(Value::Null) => data = Some(json!({"setup": true})),
            Some(_) => {
                return Err(FerryError::Config(
                    "--setup needs --data to be a JSON object".to_string(),
                ))
            }
        }
    }

    let request = ConnectRequest {
        connection: Some(resolve_connection(config, conn)?),
        data,
    };
    let reply = dispatcher.connect(request).await?;
    print_reply(&Reply::Connect(reply))
}

pub async fn exec<F: ClientFactory>(
    config: &AppConfig,
    dispatcher: &Dispatcher<F>,
    conn: &str,
    code: String,
) -> Result<ExitCode> {
    let request = ExecuteRequest {
        connection: Some(resolve_connection(config, conn)?),
        code,
    };
    let reply = dispatcher.execute(request).await?;
    print_reply(&Reply::Execute(reply))
}

pub async fn action<F: ClientFactory>(
    config: &AppConfig,
    dispatcher: &Dispatcher<F>,
    conn: &str,
    action: String,
    data: Option<String>,
) -> Result<ExitCode> {
    let request = ActionRequest {
        connection: Some(resolve_connection(config, conn)?),
        action,
        data: parse_data(data)?.unwrap_or_default(),
    };
    let reply = dispatcher.action(request).await?;
    print_reply(&Reply::Action(reply))
}

pub async fn info<F: ClientFactory>(
    config: &AppConfig,
    dispatcher: &Dispatcher<F>,
    conn: &str,
) -> Result<ExitCode> {
    let request = InfoRequest {
        connection: Some(resolve_connection(config, conn)?),
    };
    let reply = dispatcher.info(request).await?;
    print_reply(&Reply::Info(reply))
}

fn parse_data(data: Option<String>) -> Result<Option<Value>> {
    data.map(|raw| {
        serde_json::from_str(&raw)
            .map_err(|e| FerryError::Config(format!("Invalid --data JSON: {}", e)))
    })
    .transpose()
}

/// Replies go to stdout as JSON; failures are also summarized on stderr.
fn print_reply(reply: &Reply) -> Result<ExitCode> {
    match reply {
        Reply::Execute(ExecuteReply::Output(output)) => println!("{}", output),
        other => println!("{}", serde_json::to_string_pretty(other)?),
    }

    if reply.is_error() {
        eprintln!(
            "{} {} failed",
            style("✗").red().bold(),
            style(reply.name().trim_end_matches(".reply")).cyan()
        );
        return Ok(ExitCode::FAILURE);
    }

    Ok(ExitCode::SUCCESS)
}

/// Turn a CLI connection argument into a descriptor.
///
/// Tries inline JSON, then a named connection from config, then a URI.
pub fn resolve_connection(config: &AppConfig, conn: &str) -> Result<ConnectionDescriptor> {
    let conn = conn.trim();

    if conn.starts_with('{') {
        return serde_json::from_str(conn)
            .map_err(|e| FerryError::Config(format!("Invalid connection JSON: {}", e)));
    }

    if let Some(named) = config.connection(conn) {
        return Ok(named.clone());
    }

    parse_uri(conn)
}

fn parse_uri(uri: &str) -> Result<ConnectionDescriptor> {
    if uri == "local" || uri == "local://" {
        return Ok(ConnectionDescriptor::new(TransportKind::Local));
    }

    let unknown = || {
        FerryError::Config(format!(
            "Unknown connection '{}'. Use a configured name, inline JSON, or a URI \
             like ssh://user@host, docker://container, kubectl://namespace/pod",
            uri
        ))
    };

    let (scheme, rest) = uri.split_once("://").ok_or_else(unknown)?;
    let rest = rest.trim_end_matches('/');
    if rest.is_empty() {
        return Err(FerryError::Config(format!("Missing target in '{}'", uri)));
    }

    match TransportKind::from_str(scheme).ok_or_else(unknown)? {
        TransportKind::Local => Ok(ConnectionDescriptor::new(TransportKind::Local).with_param("workdir", rest)),
        TransportKind::Ssh => {
            let mut descriptor = ConnectionDescriptor::new(TransportKind::Ssh);

            let host_port = match rest.split_once('@') {
                Some((user, host_port)) => {
                    descriptor = descriptor.with_param("user", user);
                    host_port
                }
                None => rest,
            };

            match host_port.rsplit_once(':') {
                Some((host, port)) => {
                    let port: u16 = port
                        .parse()
                        .map_err(|_| FerryError::Config(format!("Invalid port in '{}'", uri)))?;
                    Ok(descriptor.with_param("host", host).with_param("port", port))
                }
                None => Ok(descriptor.with_param("host", host_port)),
            }
        }
        TransportKind::Docker => {
            Ok(ConnectionDescriptor::new(TransportKind::Docker).with_param("container", rest))
        }
        TransportKind::Kubectl => {
            let parts: Vec<&str> = rest.split('/').collect();
            let descriptor = ConnectionDescriptor::new(TransportKind::Kubectl);

            match parts.as_slice() {
                [pod] => Ok(descriptor.with_param("pod", *pod)),
                [namespace, pod] => Ok(descriptor
                    .with_param("namespace", *namespace)
                    .with_param("pod", *pod)),
                [namespace, pod, container] => Ok(descriptor
                    .with_param("namespace", *namespace)
                    .with_param("pod", *pod)
                    .with_param("container", *container)),
                _ => Err(FerryError::Config(format!(
                    "Expected kubectl://[namespace/]pod[/container], got '{}'",
                    uri
                ))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(uri: &str) -> Value {
        serde_json::to_value(parse_uri(uri).unwrap()).unwrap()
    }

    #[test]
    fn test_parse_local() {
        assert_eq!(parsed("local"), json!({"type": "local"}));
        assert_eq!(parsed("local:///srv/app"), json!({"type": "local", "workdir": "/srv/app"}));
    }

    #[test]
    fn test_parse_ssh_uri() {
        assert_eq!(parsed("ssh://example.com"), json!({"type": "ssh", "host": "example.com"}));
        assert_eq!(
            parsed("ssh://deploy@10.0.0.5:2222"),
            json!({"type": "ssh", "host": "10.0.0.5", "user": "deploy", "port": 2222})
        );
        assert!(parse_uri("ssh://host:ninety").is_err());
    }

    #[test]
    fn test_parse_docker_uri() {
        assert_eq!(parsed("docker://web-1"), json!({"type": "docker", "container": "web-1"}));
    }

    #[test]
    fn test_parse_kubectl_uri() {
        assert_eq!(parsed("kubectl://api-0"), json!({"type": "kubectl", "pod": "api-0"}));
        assert_eq!(
            parsed("kubectl://prod/api-0/app"),
            json!({"type": "kubectl", "namespace": "prod", "pod": "api-0", "container": "app"})
        );
        assert!(parse_uri("kubectl://a/b/c/d").is_err());
    }

    #[test]
    fn test_parse_unknown() {
        assert!(parse_uri("ftp://files").is_err());
        assert!(parse_uri("somewhere").is_err());
        assert!(parse_uri("docker://").is_err());
    }

    #[test]
    fn test_resolve_prefers_json_then_named() {
        let mut config = AppConfig::default();
        config.connections.insert(
            "web".to_string(),
            ConnectionDescriptor::new(TransportKind::Docker).with_param("container", "web-1"),
        );

        let named = resolve_connection(&config, "web").unwrap();
        assert_eq!(named.label(), "docker:web-1");

        let inline = resolve_connection(&config, r#"{"type":"ssh","host":"h"}"#).unwrap();
        assert_eq!(inline.label(), "ssh:h");

        assert!(resolve_connection(&config, "{not json").is_err());
    }

    #[test]
    fn test_parse_data() {
        assert_eq!(parse_data(None).unwrap(), None);
        assert_eq!(parse_data(Some("[1,2]".to_string())).unwrap(), Some(json!([1, 2])));
        assert!(parse_data(Some("{".to_string())).is_err());
    }
}
