use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::error::DiscoveryError;
use crate::wire::MULTICAST_GROUP;

fn multicast_interfaces() -> Vec<netdev::Interface> {
    netdev::get_interfaces()
        .into_iter()
        .filter(|iface| iface.is_up() && iface.is_multicast())
        .collect()
}

/// The address this host would be reached at on the LAN: the first IPv4
/// address of the default outbound interface, falling back to any up,
/// non-loopback interface.
pub fn primary_ipv4() -> Option<Ipv4Addr> {
    if let Ok(default_iface) = netdev::get_default_interface() {
        if let Some(net) = default_iface.ipv4.first() {
            return Some(net.addr());
        }
    }

    netdev::get_interfaces()
        .into_iter()
        .filter(|iface| iface.is_up() && !iface.is_loopback())
        .find_map(|iface| iface.ipv4.first().map(|net| net.addr()))
}

/// Binds one multicast-joined UDP socket per IPv4 address on every
/// multicast-capable, up interface, all listening on the SSDP port.
pub async fn bind_multicast_sockets() -> Result<Vec<Arc<UdpSocket>>, DiscoveryError> {
    let mut sockets = Vec::new();

    for iface in multicast_interfaces() {
        for ipv4_net in iface.ipv4 {
            let interface_ip = ipv4_net.addr();

            let socket = tokio::task::spawn_blocking(move || {
                let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
                let bind_addr =
                    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), crate::wire::MULTICAST_PORT);

                socket.set_reuse_address(true)?;
                #[cfg(not(target_os = "windows"))]
                socket.set_reuse_port(true)?;
                socket.bind(&bind_addr.into())?;

                socket.set_multicast_ttl_v4(4)?;
                socket.set_multicast_loop_v4(true)?;
                socket.set_multicast_if_v4(&interface_ip)?;
                socket.join_multicast_v4(&MULTICAST_GROUP, &interface_ip)?;

                Ok::<_, std::io::Error>(socket)
            })
            .await
            .expect("socket setup task panicked")?;

            let std_socket: std::net::UdpSocket = socket.into();
            let tokio_socket = UdpSocket::from_std(std_socket)?;
            sockets.push(Arc::new(tokio_socket));
        }
    }

    if sockets.is_empty() {
        return Err(DiscoveryError::NoInterfaces);
    }

    Ok(sockets)
}

/// Binds a single ephemeral, non-multicast-joined socket for the client
/// side: sending `M-SEARCH` to the multicast group and receiving unicast
/// replies doesn't require group membership.
pub async fn bind_client_socket() -> Result<UdpSocket, DiscoveryError> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    Ok(socket)
}
