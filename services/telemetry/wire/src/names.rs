//! Display-name mapping for device enumeration codes.
//!
//! The firmware grows new hardware models and roles faster than ingesters
//! update, so unmapped codes fall back to an `unknown(code)` sentinel
//! instead of failing the enrichment step.

/// Map a hardware model code to its firmware name.
pub fn hw_model_name(code: i32) -> String {
    let name = match code {
        0 => "UNSET",
        1 => "TLORA_V2",
        2 => "TLORA_V1",
        3 => "TLORA_V2_1_1P6",
        4 => "TBEAM",
        5 => "HELTEC_V2_0",
        6 => "TBEAM_V0P7",
        7 => "T_ECHO",
        8 => "TLORA_V1_1P3",
        9 => "RAK4631",
        10 => "HELTEC_V2_1",
        11 => "HELTEC_V1",
        12 => "LILYGO_TBEAM_S3_CORE",
        13 => "RAK11200",
        14 => "NANO_G1",
        25 => "STATION_G1",
        26 => "RAK11310",
        31 => "RPI_PICO",
        39 => "DIY_V1",
        43 => "HELTEC_V3",
        44 => "HELTEC_WSL_V3",
        47 => "RPI_PICO2",
        50 => "T_DECK",
        51 => "T_WATCH_S3",
        57 => "HELTEC_HT62",
        64 => "STATION_G2",
        71 => "TRACKER_T1000_E",
        _ => return format!("unknown({code})"),
    };
    name.to_string()
}

/// Map a device role code to its firmware name.
pub fn role_name(code: i32) -> String {
    let name = match code {
        0 => "CLIENT",
        1 => "CLIENT_MUTE",
        2 => "ROUTER",
        3 => "ROUTER_CLIENT",
        4 => "REPEATER",
        5 => "TRACKER",
        6 => "SENSOR",
        7 => "TAK",
        8 => "CLIENT_HIDDEN",
        9 => "LOST_AND_FOUND",
        10 => "TAK_TRACKER",
        _ => return format!("unknown({code})"),
    };
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes() {
        assert_eq!(hw_model_name(9), "RAK4631");
        assert_eq!(role_name(2), "ROUTER");
    }

    #[test]
    fn test_unknown_codes_get_sentinel() {
        assert_eq!(hw_model_name(9999), "unknown(9999)");
        assert_eq!(role_name(-1), "unknown(-1)");
    }
}
