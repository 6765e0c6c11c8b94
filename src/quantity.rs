//! Kubernetes CPU/memory quantity parsing and formatting.
//!
//! The engine operates internally in millicores (CPU) and bytes (memory);
//! these helpers convert to and from the quantity strings used on the wire
//! (`"100m"`, `"1"`, `"500n"`, `"128Mi"`, `"1Gi"`, `"500M"`, ...).

/// Parse a CPU quantity string to millicores. Unparseable input yields `0`.
pub fn parse_cpu_millicores(quantity: &str) -> u64 {
    let quantity = quantity.trim();

    if let Some(val) = quantity.strip_suffix('n') {
        val.parse::<u64>().map(|n| n / 1_000_000).unwrap_or(0)
    } else if let Some(val) = quantity.strip_suffix('u') {
        val.parse::<u64>().map(|u| u / 1_000).unwrap_or(0)
    } else if let Some(val) = quantity.strip_suffix('m') {
        val.parse::<u64>().unwrap_or(0)
    } else {
        quantity
            .parse::<f64>()
            .map(|cores| (cores * 1000.0).round() as u64)
            .unwrap_or(0)
    }
}

/// Format millicores as a Kubernetes CPU quantity string.
///
/// Whole-core values are emitted without the `m` suffix, matching how
/// `kubectl` normally displays them.
pub fn format_cpu_millicores(millicores: u64) -> String {
    if millicores >= 1000 && millicores % 1000 == 0 {
        format!("{}", millicores / 1000)
    } else {
        format!("{millicores}m")
    }
}

/// Parse a memory quantity string to bytes. Unparseable input yields `0`.
pub fn parse_memory_bytes(quantity: &str) -> u64 {
    let quantity = quantity.trim();

    if let Some(val) = quantity.strip_suffix("Ki") {
        val.parse::<f64>().map(|k| (k * 1024.0) as u64).unwrap_or(0)
    } else if let Some(val) = quantity.strip_suffix("Mi") {
        val.parse::<f64>()
            .map(|m| (m * 1024.0 * 1024.0) as u64)
            .unwrap_or(0)
    } else if let Some(val) = quantity.strip_suffix("Gi") {
        val.parse::<f64>()
            .map(|g| (g * 1024.0 * 1024.0 * 1024.0) as u64)
            .unwrap_or(0)
    } else if let Some(val) = quantity.strip_suffix("Ti") {
        val.parse::<f64>()
            .map(|t| (t * 1024.0 * 1024.0 * 1024.0 * 1024.0) as u64)
            .unwrap_or(0)
    } else if let Some(val) = quantity
        .strip_suffix('K')
        .or_else(|| quantity.strip_suffix('k'))
    {
        val.parse::<f64>().map(|k| (k * 1000.0) as u64).unwrap_or(0)
    } else if let Some(val) = quantity.strip_suffix('M') {
        val.parse::<f64>().map(|m| (m * 1_000_000.0) as u64).unwrap_or(0)
    } else if let Some(val) = quantity.strip_suffix('G') {
        val.parse::<f64>()
            .map(|g| (g * 1_000_000_000.0) as u64)
            .unwrap_or(0)
    } else {
        quantity.parse::<u64>().unwrap_or(0)
    }
}

/// Format bytes as a Kubernetes memory quantity string, preferring binary
/// (`Gi`/`Mi`/`Ki`) units since that's what the resize subresource expects back.
pub fn format_memory_bytes(bytes: u64) -> String {
    const GI: u64 = 1024 * 1024 * 1024;
    const MI: u64 = 1024 * 1024;
    const KI: u64 = 1024;

    if bytes >= GI && bytes % GI == 0 {
        format!("{}Gi", bytes / GI)
    } else if bytes >= MI {
        format!("{}Mi", bytes.div_ceil(MI))
    } else if bytes >= KI {
        format!("{}Ki", bytes.div_ceil(KI))
    } else {
        format!("{bytes}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_roundtrip_millicores() {
        assert_eq!(parse_cpu_millicores("100m"), 100);
        assert_eq!(parse_cpu_millicores("1"), 1000);
        assert_eq!(parse_cpu_millicores("0.5"), 500);
        assert_eq!(parse_cpu_millicores("2.5"), 2500);
        assert_eq!(parse_cpu_millicores("500000000n"), 500);
        assert_eq!(parse_cpu_millicores("500000u"), 500);
    }

    #[test]
    fn cpu_formats_whole_cores_without_suffix() {
        assert_eq!(format_cpu_millicores(2000), "2");
        assert_eq!(format_cpu_millicores(1500), "1500m");
    }

    #[test]
    fn memory_roundtrip_bytes() {
        assert_eq!(parse_memory_bytes("128Mi"), 128 * 1024 * 1024);
        assert_eq!(parse_memory_bytes("1Gi"), 1024 * 1024 * 1024);
        assert_eq!(parse_memory_bytes("256Ki"), 256 * 1024);
        assert_eq!(parse_memory_bytes("500M"), 500_000_000);
        assert_eq!(parse_memory_bytes("1G"), 1_000_000_000);
        assert_eq!(parse_memory_bytes("1000000"), 1_000_000);
    }

    #[test]
    fn memory_formats_prefer_gi() {
        assert_eq!(format_memory_bytes(2 * 1024 * 1024 * 1024), "2Gi");
        assert_eq!(format_memory_bytes(512 * 1024 * 1024), "512Mi");
    }
}
