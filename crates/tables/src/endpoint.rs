//! Connection endpoints: an IP address, a socket address, or a team number.
//!
//! Team numbers follow the FRC field convention and resolve to `10.TE.AM.2`,
//! so team 4030 becomes `10.40.30.2`.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

use crate::transport::TransportError;

/// Default shared-table port.
pub const DEFAULT_PORT: u16 = 1735;

/// Address of a remote shared-table server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
	/// Team number resolved through the `10.TE.AM.2` convention.
	Team(u16),
	/// Bare IP address; the port is supplied at connect time.
	Ip(IpAddr),
	/// Fully specified socket address.
	Socket(SocketAddr),
}

impl Endpoint {
	/// Parses user input.
	///
	/// Input that parses as an integer is taken as a team number. Otherwise it must
	/// be an IP address, with or without a port.
	///
	/// # Errors
	///
	/// Returns [`TransportError::InvalidEndpoint`] for anything else, including team
	/// numbers too large to map onto an address.
	pub fn parse(input: &str) -> Result<Self, TransportError> {
		let input = input.trim();
		let invalid = || TransportError::InvalidEndpoint(input.to_owned());

		if let Ok(team) = input.parse::<u32>() {
			return u16::try_from(team)
				.ok()
				.filter(|team| team / 100 <= u16::from(u8::MAX))
				.map(Self::Team)
				.ok_or_else(invalid);
		}
		if let Ok(addr) = input.parse::<SocketAddr>() {
			return Ok(Self::Socket(addr));
		}
		input.parse::<IpAddr>().map(Self::Ip).map_err(|_| invalid())
	}

	/// Resolves to a socket address, using `default_port` unless one was given.
	pub fn socket_addr(&self, default_port: u16) -> SocketAddr {
		match *self {
			Self::Team(team) => SocketAddr::new(IpAddr::V4(team_address(team)), default_port),
			Self::Ip(ip) => SocketAddr::new(ip, default_port),
			Self::Socket(addr) => addr,
		}
	}
}

/// Field address for a team number.
pub fn team_address(team: u16) -> Ipv4Addr {
	// Callers outside `parse` may pass teams above 25599; the high octet saturates.
	let high = u8::try_from(team / 100).unwrap_or(u8::MAX);
	let low = (team % 100) as u8;
	Ipv4Addr::new(10, high, low, 2)
}

impl FromStr for Endpoint {
	type Err = TransportError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}

impl fmt::Display for Endpoint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Team(team) => write!(f, "team {team} ({})", team_address(*team)),
			Self::Ip(ip) => write!(f, "{ip}"),
			Self::Socket(addr) => write!(f, "{addr}"),
		}
	}
}
