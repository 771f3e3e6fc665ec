//! 工具函数模块

/// 补全监听地址：`:9090` → `0.0.0.0:9090`
pub fn bind_address(address: &str) -> String {
    let address = address.trim();
    if address.starts_with(':') {
        format!("0.0.0.0{address}")
    } else {
        address.to_string()
    }
}

/// 本机拨号地址：通配主机替换为 `127.0.0.1`，并补上 `http://` 前缀
pub fn dial_target(address: &str) -> String {
    let address = bind_address(address);
    let (host, port) = split_host_port(&address);
    let host = match host {
        "" | "0.0.0.0" | "[::]" | "::" => "127.0.0.1",
        other => other,
    };
    match port {
        Some(port) => format!("http://{host}:{port}"),
        None => format!("http://{host}"),
    }
}

/// 提取端口号
pub fn port_of(address: &str) -> Option<u16> {
    split_host_port(address.trim()).1.and_then(|p| p.parse().ok())
}

fn split_host_port(address: &str) -> (&str, Option<&str>) {
    match address.rsplit_once(':') {
        // 裸 IPv6 地址没有端口
        Some((host, _)) if host.contains(':') && !host.ends_with(']') => (address, None),
        Some((host, port)) => (host, Some(port)),
        None => (address, None),
    }
}
