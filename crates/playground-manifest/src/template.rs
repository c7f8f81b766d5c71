//! Template directives in service args and env values.
//!
//! Four directives are understood:
//! - `{{Port "<name>" <default>}}` declares a TCP port on the owning service
//! - `{{PortUDP "<name>" <default>}}` declares a UDP port
//! - `{{Service "<service>" "<port>" "<protocol>" "<user>"}}` references another service's port
//! - `{{Bootnode}}` expands to the enode URL of the context bootnode
//!
//! Templates are handled twice. The recording pass runs while the manifest is
//! assembled and registers ports and node references on the owning service.
//! The execution pass runs once host ports are reserved and replaces each
//! directive with a concrete value, depending on whether caller and target run
//! in containers or on the host.

use crate::{BootnodeRef, Error, NodeRef, Protocol, Result, Service};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Hostname containers use to reach services running on the host
pub const HOST_DOCKER_INTERNAL: &str = "host.docker.internal";

static DIRECTIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(.*?)\}\}").expect("directive regex is valid"));

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]*)"|(\S+)"#).expect("token regex is valid"));

/// A parsed template directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// `{{Port "name" default}}`
    Port {
        /// Port label
        name: String,
        /// Container port
        default: u16,
    },
    /// `{{PortUDP "name" default}}`
    PortUdp {
        /// Port label
        name: String,
        /// Container port
        default: u16,
    },
    /// `{{Service "service" "port" "protocol" "user"}}`
    Service {
        /// Target service
        service: String,
        /// Port label on the target
        port: String,
        /// Scheme prefix
        protocol: String,
        /// User prefix
        user: String,
    },
    /// `{{Bootnode}}`
    Bootnode,
}

enum Token<'a> {
    Quoted(&'a str),
    Word(&'a str),
}

impl Directive {
    fn parse(inner: &str) -> Result<Self> {
        let tokens: Vec<Token<'_>> = TOKEN_RE
            .captures_iter(inner)
            .filter_map(|c| match (c.get(1), c.get(2)) {
                (Some(q), _) => Some(Token::Quoted(q.as_str())),
                (None, Some(w)) => Some(Token::Word(w.as_str())),
                _ => None,
            })
            .collect();

        let bad = || Error::Template(format!("unsupported directive '{{{{{}}}}}'", inner.trim()));

        let (head, rest) = match tokens.split_first() {
            Some((Token::Word(head), rest)) => (*head, rest),
            _ => return Err(bad()),
        };

        match (head, rest) {
            ("Port" | "PortUDP", [Token::Quoted(name), Token::Word(default)]) => {
                let default = default.parse::<u16>().map_err(|_| {
                    Error::Template(format!("invalid port number '{}' for '{}'", default, name))
                })?;
                let name = name.to_string();
                Ok(if head == "Port" {
                    Directive::Port { name, default }
                } else {
                    Directive::PortUdp { name, default }
                })
            }
            ("Service", args) if (2..=4).contains(&args.len()) => {
                let mut quoted = Vec::with_capacity(4);
                for arg in args {
                    match arg {
                        Token::Quoted(s) => quoted.push(s.to_string()),
                        Token::Word(_) => return Err(bad()),
                    }
                }
                quoted.resize(4, String::new());
                let user = quoted.pop().unwrap_or_default();
                let protocol = quoted.pop().unwrap_or_default();
                let port = quoted.pop().unwrap_or_default();
                let service = quoted.pop().unwrap_or_default();
                Ok(Directive::Service { service, port, protocol, user })
            }
            ("Bootnode", []) => Ok(Directive::Bootnode),
            _ => Err(bad()),
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::Port { name, default } => write!(f, "{{{{Port \"{}\" {}}}}}", name, default),
            Directive::PortUdp { name, default } => {
                write!(f, "{{{{PortUDP \"{}\" {}}}}}", name, default)
            }
            Directive::Service { service, port, protocol, user } => write!(
                f,
                "{{{{Service \"{}\" \"{}\" \"{}\" \"{}\"}}}}",
                service, port, protocol, user
            ),
            Directive::Bootnode => write!(f, "{{{{Bootnode}}}}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Directive { directive: Directive, raw: String },
}

/// A string split into literal text and directives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Parse a template string
    pub fn parse(input: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut last = 0;
        for cap in DIRECTIVE_RE.captures_iter(input) {
            let (Some(whole), Some(inner)) = (cap.get(0), cap.get(1)) else {
                continue;
            };
            if whole.start() > last {
                segments.push(Segment::Text(input[last..whole.start()].to_string()));
            }
            segments.push(Segment::Directive {
                directive: Directive::parse(inner.as_str())?,
                raw: whole.as_str().to_string(),
            });
            last = whole.end();
        }
        if last < input.len() {
            segments.push(Segment::Text(input[last..].to_string()));
        }
        Ok(Self { segments })
    }

    /// Directives in order of appearance
    pub fn directives(&self) -> impl Iterator<Item = &Directive> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Directive { directive, .. } => Some(directive),
            Segment::Text(_) => None,
        })
    }

    /// Services referenced through `{{Service}}`
    pub fn referenced_services(&self) -> Vec<&str> {
        self.directives()
            .filter_map(|d| match d {
                Directive::Service { service, .. } => Some(service.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Recording pass: register ports and node references on `owner` and
    /// return an equivalent template string
    pub fn record(&self, owner: &mut Service) -> Result<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Directive { directive, raw } => {
                    match directive {
                        Directive::Port { name, default } => {
                            owner.declare_port(name, *default, Protocol::Tcp)?;
                            out.push_str(&directive.to_string());
                        }
                        Directive::PortUdp { name, default } => {
                            owner.declare_port(name, *default, Protocol::Udp)?;
                            out.push_str(&directive.to_string());
                        }
                        Directive::Service { service, port, protocol, user } => {
                            owner.add_node_ref(NodeRef {
                                service: service.clone(),
                                port_label: port.clone(),
                                protocol: protocol.clone(),
                                user: user.clone(),
                            });
                            out.push_str(raw);
                        }
                        Directive::Bootnode => out.push_str(&directive.to_string()),
                    }
                }
            }
        }
        Ok(out)
    }

    /// Execution pass: replace every directive with its concrete value
    pub fn resolve(&self, owner: &Service, ctx: &ResolveContext<'_>) -> Result<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Directive { directive, .. } => {
                    out.push_str(&ctx.expand(owner, directive)?);
                }
            }
        }
        Ok(out)
    }
}

/// Parse and record a single string
pub fn record(owner: &mut Service, input: &str) -> Result<String> {
    Template::parse(input)?.record(owner)
}

/// Parse and resolve a single string
pub fn resolve(owner: &Service, input: &str, ctx: &ResolveContext<'_>) -> Result<String> {
    Template::parse(input)?.resolve(owner, ctx)
}

/// Whether `input` references `service` through a `{{Service}}` directive.
///
/// Unparseable strings fall back to a textual match.
pub fn references_service(input: &str, service: &str) -> bool {
    match Template::parse(input) {
        Ok(template) => template.referenced_services().contains(&service),
        Err(_) => input.contains(&format!("{{{{Service \"{}\"", service)),
    }
}

/// Recording pass over every arg and env value of a service.
///
/// Node references are rebuilt from scratch so they always reflect the
/// current args and env. Ports are only ever added.
pub fn record_service(service: &mut Service) -> Result<()> {
    service.node_refs.clear();

    let args = std::mem::take(&mut service.args);
    let mut recorded = Vec::with_capacity(args.len());
    for arg in &args {
        recorded.push(record(service, arg)?);
    }
    service.args = recorded;

    let env = std::mem::take(&mut service.env);
    let mut recorded = std::collections::BTreeMap::new();
    for (key, value) in &env {
        recorded.insert(key.clone(), record(service, value)?);
    }
    service.env = recorded;
    Ok(())
}

/// Address book used by the execution pass
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    services: &'a [Service],
    bootnode: Option<&'a BootnodeRef>,
}

impl<'a> ResolveContext<'a> {
    /// Create a context over the manifest's services
    pub fn new(services: &'a [Service]) -> Self {
        Self { services, bootnode: None }
    }

    /// Designate the bootnode
    pub fn with_bootnode(mut self, bootnode: Option<&'a BootnodeRef>) -> Self {
        self.bootnode = bootnode;
        self
    }

    fn service(&self, name: &str) -> Result<&'a Service> {
        self.services
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| Error::ServiceNotFound(name.to_string()))
    }

    /// `host:port` at which `caller` reaches port `port_label` of `target`
    pub fn address(&self, caller: &Service, target: &Service, port_label: &str) -> Result<String> {
        let port = target.port(port_label).ok_or_else(|| {
            Error::Template(format!(
                "service '{}' has no port '{}'",
                target.name, port_label
            ))
        })?;
        let host_port = || {
            port.host_port.ok_or_else(|| {
                Error::Template(format!(
                    "port '{}' of service '{}' has no reserved host port",
                    port_label, target.name
                ))
            })
        };

        Ok(match (caller.runs_on_host(), target.runs_on_host()) {
            (false, false) => format!("{}:{}", target.name, port.container_port),
            (false, true) => format!("{}:{}", HOST_DOCKER_INTERNAL, host_port()?),
            (true, _) => format!("localhost:{}", host_port()?),
        })
    }

    fn expand(&self, owner: &Service, directive: &Directive) -> Result<String> {
        match directive {
            Directive::Port { name, default } | Directive::PortUdp { name, default } => {
                let protocol = match directive {
                    Directive::PortUdp { .. } => Protocol::Udp,
                    _ => Protocol::Tcp,
                };
                let port = owner.port_with_protocol(name, protocol).ok_or_else(|| {
                    Error::Template(format!(
                        "port '{}' ({}) was never recorded on service '{}'",
                        name, default, owner.name
                    ))
                })?;
                if owner.runs_on_host() {
                    port.host_port.map(|p| p.to_string()).ok_or_else(|| {
                        Error::Template(format!(
                            "port '{}' of host service '{}' has no reserved host port",
                            name, owner.name
                        ))
                    })
                } else {
                    Ok(port.container_port.to_string())
                }
            }
            Directive::Service { service, port, protocol, user } => {
                let target = self.service(service)?;
                let mut out = String::new();
                if !protocol.is_empty() {
                    out.push_str(protocol);
                    out.push_str("://");
                }
                if !user.is_empty() {
                    out.push_str(user);
                    out.push('@');
                }
                out.push_str(&self.address(owner, target, port)?);
                Ok(out)
            }
            Directive::Bootnode => match self.bootnode {
                None => Ok(String::new()),
                Some(bootnode) => {
                    let target = self.service(&bootnode.service)?;
                    Ok(format!(
                        "enode://{}@{}",
                        bootnode.id,
                        self.address(owner, target, "rlpx")?
                    ))
                }
            },
        }
    }
}
