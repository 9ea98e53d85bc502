/// This module resolves how to reach a chamber: either from a bare IP address
/// (mapped to the chamber's fixed TCP port) or from a resource string of the
/// form "TCPIP0::192.168.1.10::57732::SOCKET" or "serial::/dev/ttyUSB0::9600".
use crate::error::{ChamberError, ChamberResult};
use std::fmt;
use std::fmt::{Display, Formatter};

/// TCP port the chamber listens on.
pub const CHAMBER_TCP_PORT: u16 = 57732;

/// Baud rate used when a serial resource string does not name one.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// How the caller identified the chamber. Exactly one addressing mode is
/// allowed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChamberIdentity {
    /// Network host; the fixed chamber port is implied
    IpAddress(String),
    /// Pre-formed resource string
    Resource(String),
}

impl ChamberIdentity {
    /// Build an identity from the two optional addressing inputs.
    ///
    /// Fails with `AddressingConflict` if both are given and `MissingAddress`
    /// if neither is.
    pub fn from_parts(ip_address: Option<&str>, resource: Option<&str>) -> ChamberResult<Self> {
        match (ip_address, resource) {
            (Some(_), Some(_)) => Err(ChamberError::AddressingConflict),
            (None, None) => Err(ChamberError::MissingAddress),
            (Some(ip), None) => Ok(ChamberIdentity::IpAddress(ip.trim().to_string())),
            (None, Some(resource)) => Ok(ChamberIdentity::Resource(resource.trim().to_string())),
        }
    }

    /// Socket-style resource string for this identity.
    pub fn resource_string(&self) -> String {
        match self {
            ChamberIdentity::IpAddress(ip) => format!("TCPIP0::{}::{}::SOCKET", ip, CHAMBER_TCP_PORT),
            ChamberIdentity::Resource(resource) => resource.clone(),
        }
    }

    /// Parse the resource string into a concrete address.
    pub fn address(&self) -> ChamberResult<ResourceAddress> {
        ResourceAddress::parse(&self.resource_string())
    }
}

/// Represents a parsed resource string.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ResourceAddress {
    /// Raw TCP socket
    Tcp { host: String, port: u16 },
    /// Serial port
    Serial { path: String, baud_rate: u32 },
}

impl ResourceAddress {
    /// Parse a resource string.
    ///
    /// Accepted forms:
    /// - `TCPIP[n]::<host>::<port>::SOCKET`
    /// - `tcp::<host>:<port>`
    /// - `serial::<path>[::<baud>]`
    /// - `ASRL<path>::INSTR`
    pub fn parse(resource: &str) -> ChamberResult<Self> {
        let invalid = || ChamberError::InvalidAddress(resource.to_string());
        let splits: Vec<&str> = resource.trim().split("::").collect();
        if splits.len() < 2 || splits.iter().any(|s| s.is_empty()) {
            return Err(invalid());
        }

        let kind = splits[0].to_lowercase();
        if kind.starts_with("tcpip") && kind[5..].chars().all(|c| c.is_ascii_digit()) {
            // TCPIP0::192.168.1.10::57732::SOCKET
            if splits.len() != 4 || !splits[3].eq_ignore_ascii_case("socket") {
                return Err(invalid());
            }
            let port: u16 = splits[2].parse().map_err(|_| invalid())?;
            Ok(ResourceAddress::Tcp {
                host: splits[1].to_string(),
                port,
            })
        } else if kind == "tcp" {
            // tcp::192.168.1.10:57732
            if splits.len() != 2 {
                return Err(invalid());
            }
            let (host, port) = splits[1].rsplit_once(':').ok_or_else(invalid)?;
            if host.is_empty() {
                return Err(invalid());
            }
            let port: u16 = port.parse().map_err(|_| invalid())?;
            Ok(ResourceAddress::Tcp {
                host: host.to_string(),
                port,
            })
        } else if kind == "serial" {
            // serial::/dev/ttyUSB0::9600
            let baud_rate = match splits.len() {
                2 => DEFAULT_BAUD_RATE,
                3 => splits[2].parse().map_err(|_| invalid())?,
                _ => return Err(invalid()),
            };
            Ok(ResourceAddress::Serial {
                path: splits[1].to_string(),
                baud_rate,
            })
        } else if kind.starts_with("asrl") && splits.len() == 2 && splits[1].eq_ignore_ascii_case("instr") {
            // ASRL/dev/ttyUSB0::INSTR
            let path = splits[0].get(4..).unwrap_or_default();
            if path.is_empty() {
                return Err(invalid());
            }
            Ok(ResourceAddress::Serial {
                path: path.to_string(),
                baud_rate: DEFAULT_BAUD_RATE,
            })
        } else {
            Err(invalid())
        }
    }
}

impl Display for ResourceAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ResourceAddress::Tcp { host, port } => write!(f, "tcp::{}:{}", host, port),
            ResourceAddress::Serial { path, baud_rate } => write!(f, "serial::{}::{}", path, baud_rate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ip_address_maps_to_fixed_port() {
        let identity = ChamberIdentity::from_parts(Some("192.168.1.10"), None).unwrap();
        assert_eq!(identity.resource_string(), "TCPIP0::192.168.1.10::57732::SOCKET");
        assert_eq!(
            identity.address().unwrap(),
            ResourceAddress::Tcp {
                host: "192.168.1.10".to_string(),
                port: CHAMBER_TCP_PORT,
            }
        );
    }

    #[test]
    fn exactly_one_addressing_mode() {
        assert!(matches!(
            ChamberIdentity::from_parts(Some("10.0.0.1"), Some("tcp::10.0.0.1:57732")),
            Err(ChamberError::AddressingConflict)
        ));
        assert!(matches!(
            ChamberIdentity::from_parts(None, None),
            Err(ChamberError::MissingAddress)
        ));
        assert_eq!(
            ChamberIdentity::from_parts(None, Some("serial::COM3")).unwrap(),
            ChamberIdentity::Resource("serial::COM3".to_string())
        );
    }

    #[test]
    fn parse_tcp() {
        let addr = ResourceAddress::parse("tcp::chamber.lab:4001").unwrap();
        assert_eq!(
            addr,
            ResourceAddress::Tcp {
                host: "chamber.lab".to_string(),
                port: 4001,
            }
        );
        assert_eq!(addr.to_string(), "tcp::chamber.lab:4001");

        let addr = ResourceAddress::parse("tcpip1::10.0.0.5::5025::socket").unwrap();
        assert_eq!(
            addr,
            ResourceAddress::Tcp {
                host: "10.0.0.5".to_string(),
                port: 5025,
            }
        );
    }

    #[test]
    fn parse_serial() {
        assert_eq!(
            ResourceAddress::parse("serial::/dev/ttyUSB0::19200").unwrap(),
            ResourceAddress::Serial {
                path: "/dev/ttyUSB0".to_string(),
                baud_rate: 19200,
            }
        );
        assert_eq!(
            ResourceAddress::parse("serial::COM3").unwrap(),
            ResourceAddress::Serial {
                path: "COM3".to_string(),
                baud_rate: DEFAULT_BAUD_RATE,
            }
        );
        assert_eq!(
            ResourceAddress::parse("ASRL/dev/ttyS0::INSTR").unwrap(),
            ResourceAddress::Serial {
                path: "/dev/ttyS0".to_string(),
                baud_rate: DEFAULT_BAUD_RATE,
            }
        );
    }

    #[test]
    fn parse_rejects_unsupported() {
        for resource in [
            "",
            "TCPIP0::10.0.0.1::INSTR",
            "TCPIP0::10.0.0.1::notaport::SOCKET",
            "GPIB0::12::INSTR",
            "tcp::10.0.0.1",
            "tcp:::57732",
            "serial::COM3::fast",
            "ASRL::INSTR",
            "MOCK0::mock1::INSTR",
        ] {
            assert!(
                matches!(ResourceAddress::parse(resource), Err(ChamberError::InvalidAddress(_))),
                "accepted {:?}",
                resource
            );
        }
    }
}
