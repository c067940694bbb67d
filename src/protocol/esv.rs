use std::fmt;

use serde::{Deserialize, Serialize};

/// ECHONET Lite service code
///
/// Kept as an open code set: frames carrying codes outside the standard
/// table still decode, and are dropped later by the node dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Esv(pub u8);

impl Esv {
    /// SetI: write, no response
    pub const WRITE_REQUEST: Esv = Esv(0x60);
    /// SetC: write, response required
    pub const WRITE_REQUEST_RESPONSE_REQUIRED: Esv = Esv(0x61);
    /// Get
    pub const READ_REQUEST: Esv = Esv(0x62);
    /// INF_REQ
    pub const NOTIFICATION_REQUEST: Esv = Esv(0x63);
    /// SetGet
    pub const WRITE_READ_REQUEST: Esv = Esv(0x6E);

    /// Set_Res
    pub const WRITE_RESPONSE: Esv = Esv(0x71);
    /// Get_Res
    pub const READ_RESPONSE: Esv = Esv(0x72);
    /// INF
    pub const NOTIFICATION: Esv = Esv(0x73);
    /// INFC
    pub const NOTIFICATION_RESPONSE_REQUIRED: Esv = Esv(0x74);
    /// INFC_Res
    pub const NOTIFICATION_RESPONSE: Esv = Esv(0x7A);
    /// SetGet_Res
    pub const WRITE_READ_RESPONSE: Esv = Esv(0x7E);

    /// SetI_SNA
    pub const WRITE_REQUEST_ERROR: Esv = Esv(0x50);
    /// SetC_SNA
    pub const WRITE_REQUEST_RESPONSE_REQUIRED_ERROR: Esv = Esv(0x51);
    /// Get_SNA
    pub const READ_REQUEST_ERROR: Esv = Esv(0x52);
    /// INF_SNA
    pub const NOTIFICATION_REQUEST_ERROR: Esv = Esv(0x53);
    /// SetGet_SNA
    pub const WRITE_READ_REQUEST_ERROR: Esv = Esv(0x5E);

    /// Every code defined by the standard
    pub const ALL: [Esv; 16] = [
        Esv::WRITE_REQUEST,
        Esv::WRITE_REQUEST_RESPONSE_REQUIRED,
        Esv::READ_REQUEST,
        Esv::NOTIFICATION_REQUEST,
        Esv::WRITE_READ_REQUEST,
        Esv::WRITE_RESPONSE,
        Esv::READ_RESPONSE,
        Esv::NOTIFICATION,
        Esv::NOTIFICATION_RESPONSE_REQUIRED,
        Esv::NOTIFICATION_RESPONSE,
        Esv::WRITE_READ_RESPONSE,
        Esv::WRITE_REQUEST_ERROR,
        Esv::WRITE_REQUEST_RESPONSE_REQUIRED_ERROR,
        Esv::READ_REQUEST_ERROR,
        Esv::NOTIFICATION_REQUEST_ERROR,
        Esv::WRITE_READ_REQUEST_ERROR,
    ];

    /// Request codes that have an entry in the response/error table
    pub const REQUESTS: [Esv; 6] = [
        Esv::WRITE_REQUEST,
        Esv::WRITE_REQUEST_RESPONSE_REQUIRED,
        Esv::READ_REQUEST,
        Esv::NOTIFICATION_REQUEST,
        Esv::WRITE_READ_REQUEST,
        Esv::NOTIFICATION_RESPONSE_REQUIRED,
    ];

    /// Returns the raw code
    pub const fn code(self) -> u8 {
        self.0
    }

    /// Returns true for codes defined by the standard
    pub fn is_valid(self) -> bool {
        Esv::ALL.contains(&self)
    }

    /// SetI, SetC
    pub fn is_write_request(self) -> bool {
        self == Esv::WRITE_REQUEST || self == Esv::WRITE_REQUEST_RESPONSE_REQUIRED
    }

    /// Get
    pub fn is_read_request(self) -> bool {
        self == Esv::READ_REQUEST
    }

    /// INF_REQ
    pub fn is_notification_request(self) -> bool {
        self == Esv::NOTIFICATION_REQUEST
    }

    /// SetGet
    pub fn is_write_read_request(self) -> bool {
        self == Esv::WRITE_READ_REQUEST
    }

    /// Requests validated against the destination object's properties
    pub fn is_request(self) -> bool {
        (0x60..=0x6F).contains(&self.0) && self.is_valid()
    }

    /// Requests that carry data to be written
    pub fn is_write_class(self) -> bool {
        self.is_write_request() || self.is_write_read_request()
    }

    /// Positive responses
    pub fn is_response(self) -> bool {
        matches!(
            self,
            Esv::WRITE_RESPONSE
                | Esv::READ_RESPONSE
                | Esv::NOTIFICATION_RESPONSE
                | Esv::WRITE_READ_RESPONSE
        )
    }

    /// INF, INFC
    pub fn is_notification(self) -> bool {
        self == Esv::NOTIFICATION || self == Esv::NOTIFICATION_RESPONSE_REQUIRED
    }

    /// "Service not available" responses
    pub fn is_error_response(self) -> bool {
        (0x50..=0x5F).contains(&self.0) && self.is_valid()
    }

    /// Returns true when the receiver has to answer this code
    pub fn requires_response(self) -> bool {
        self.response().is_some()
    }

    /// Returns the paired success response, if any
    pub fn response(self) -> Option<Esv> {
        match self {
            Esv::WRITE_REQUEST_RESPONSE_REQUIRED => Some(Esv::WRITE_RESPONSE),
            Esv::READ_REQUEST => Some(Esv::READ_RESPONSE),
            Esv::NOTIFICATION_REQUEST => Some(Esv::NOTIFICATION),
            Esv::WRITE_READ_REQUEST => Some(Esv::WRITE_READ_RESPONSE),
            Esv::NOTIFICATION_RESPONSE_REQUIRED => Some(Esv::NOTIFICATION_RESPONSE),
            _ => None,
        }
    }

    /// Returns the paired error ("not available") response, if any
    pub fn error(self) -> Option<Esv> {
        match self {
            Esv::WRITE_REQUEST => Some(Esv::WRITE_REQUEST_ERROR),
            Esv::WRITE_REQUEST_RESPONSE_REQUIRED => Some(Esv::WRITE_REQUEST_RESPONSE_REQUIRED_ERROR),
            Esv::READ_REQUEST => Some(Esv::READ_REQUEST_ERROR),
            Esv::NOTIFICATION_REQUEST => Some(Esv::NOTIFICATION_REQUEST_ERROR),
            Esv::WRITE_READ_REQUEST => Some(Esv::WRITE_READ_REQUEST_ERROR),
            Esv::NOTIFICATION_RESPONSE_REQUIRED => Some(Esv::NOTIFICATION_REQUEST_ERROR),
            _ => None,
        }
    }

    /// Short mnemonic used in logs
    pub fn name(self) -> &'static str {
        match self {
            Esv::WRITE_REQUEST => "SetI",
            Esv::WRITE_REQUEST_RESPONSE_REQUIRED => "SetC",
            Esv::READ_REQUEST => "Get",
            Esv::NOTIFICATION_REQUEST => "INF_REQ",
            Esv::WRITE_READ_REQUEST => "SetGet",
            Esv::WRITE_RESPONSE => "Set_Res",
            Esv::READ_RESPONSE => "Get_Res",
            Esv::NOTIFICATION => "INF",
            Esv::NOTIFICATION_RESPONSE_REQUIRED => "INFC",
            Esv::NOTIFICATION_RESPONSE => "INFC_Res",
            Esv::WRITE_READ_RESPONSE => "SetGet_Res",
            Esv::WRITE_REQUEST_ERROR => "SetI_SNA",
            Esv::WRITE_REQUEST_RESPONSE_REQUIRED_ERROR => "SetC_SNA",
            Esv::READ_REQUEST_ERROR => "Get_SNA",
            Esv::NOTIFICATION_REQUEST_ERROR => "INF_SNA",
            Esv::WRITE_READ_REQUEST_ERROR => "SetGet_SNA",
            _ => "unknown",
        }
    }
}

impl fmt::Display for Esv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}({})", self.0, self.name())
    }
}

impl From<u8> for Esv {
    fn from(code: u8) -> Self {
        Esv(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_table() {
        let table = [
            (0x60, None, 0x50),
            (0x61, Some(0x71), 0x51),
            (0x62, Some(0x72), 0x52),
            (0x63, Some(0x73), 0x53),
            (0x6E, Some(0x7E), 0x5E),
            (0x74, Some(0x7A), 0x53),
        ];
        for (req, res, err) in table {
            let esv = Esv(req);
            assert_eq!(esv.response(), res.map(Esv), "response for {}", esv);
            assert_eq!(esv.error(), Some(Esv(err)), "error for {}", esv);
        }
    }

    #[test]
    fn test_every_request_maps_to_one_error() {
        for esv in Esv::REQUESTS {
            let err = esv.error().unwrap();
            assert!(err.is_error_response());
            if let Some(res) = esv.response() {
                assert!(res.is_response() || res.is_notification());
            }
        }
    }

    #[test]
    fn test_non_requests_have_no_mapping() {
        for esv in [Esv::READ_RESPONSE, Esv::NOTIFICATION, Esv::READ_REQUEST_ERROR, Esv(0x00)] {
            assert_eq!(esv.response(), None);
            assert_eq!(esv.error(), None);
        }
    }

    #[test]
    fn test_classification() {
        assert!(Esv::READ_REQUEST.is_request());
        assert!(Esv::WRITE_READ_REQUEST.is_write_class());
        assert!(!Esv::NOTIFICATION_RESPONSE_REQUIRED.is_request());
        assert!(Esv::NOTIFICATION_RESPONSE_REQUIRED.is_notification());
        assert!(!Esv(0x65).is_valid());
        assert!(!Esv(0x65).is_request());
        assert!(!Esv::WRITE_REQUEST.requires_response());
        assert!(Esv::WRITE_REQUEST_RESPONSE_REQUIRED.requires_response());
        assert_eq!(Esv::READ_REQUEST.to_string(), "62(Get)");
    }
}
