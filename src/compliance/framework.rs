use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ComplianceError;

/// Supported compliance frameworks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Framework {
    #[serde(rename = "GDPR")]
    Gdpr,
    #[serde(rename = "ISO27001")]
    Iso27001,
    #[serde(rename = "NIST")]
    Nist,
    #[serde(rename = "PCI_DSS")]
    PciDss,
}

impl Framework {
    pub const ALL: [Framework; 4] = [
        Framework::Gdpr,
        Framework::Iso27001,
        Framework::Nist,
        Framework::PciDss,
    ];

    /// Short identifier used in report file names.
    pub fn id(&self) -> &'static str {
        match self {
            Framework::Gdpr => "GDPR",
            Framework::Iso27001 => "ISO27001",
            Framework::Nist => "NIST",
            Framework::PciDss => "PCI_DSS",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Framework::Gdpr => "General Data Protection Regulation",
            Framework::Iso27001 => "ISO 27001 Information Security Management",
            Framework::Nist => "NIST Cybersecurity Framework",
            Framework::PciDss => "Payment Card Industry Data Security Standard",
        }
    }

    /// Audit categories scored for this framework, in report order.
    pub fn categories(&self) -> &'static [&'static str] {
        match self {
            Framework::Gdpr => &["data_protection", "privacy", "consent", "breach_notification"],
            Framework::Iso27001 => &[
                "access_control",
                "cryptography",
                "physical_security",
                "operations",
            ],
            Framework::Nist => &["identify", "protect", "detect", "respond", "recover"],
            Framework::PciDss => &["cardholder_data", "transmission", "vulnerability_management"],
        }
    }

    /// `(requirement, description)` pairs shown by `compliance status`.
    pub fn requirements(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Framework::Gdpr => &[
                ("data_encryption", "Data must be encrypted at rest and in transit"),
                ("access_logging", "All data access must be logged"),
                ("consent_management", "User consent must be properly managed"),
                ("breach_reporting", "Data breaches must be reported within 72 hours"),
            ],
            Framework::Iso27001 => &[
                ("risk_assessment", "Regular risk assessments must be performed"),
                ("access_control", "Access must be controlled and monitored"),
                ("cryptography", "Cryptographic controls must be implemented"),
                ("incident_management", "Security incidents must be managed"),
            ],
            Framework::Nist => &[
                ("asset_management", "Assets must be identified and managed"),
                ("access_control", "Access to assets must be controlled"),
                ("awareness_training", "Security awareness training required"),
                ("incident_response", "Incident response plans must exist"),
            ],
            Framework::PciDss => &[
                ("data_protection", "Cardholder data must be protected"),
                ("secure_transmission", "Data must be transmitted securely"),
                ("vulnerability_scanning", "Regular vulnerability scans required"),
            ],
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Framework {
    type Err = ComplianceError;

    /// Case-insensitive; `-` and `_` are interchangeable (`pci-dss`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Framework::ALL
            .into_iter()
            .find(|fw| fw.id() == normalized)
            .ok_or_else(|| ComplianceError::UnknownFramework(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ids_loosely() {
        assert_eq!("gdpr".parse::<Framework>().unwrap(), Framework::Gdpr);
        assert_eq!("pci-dss".parse::<Framework>().unwrap(), Framework::PciDss);
        assert_eq!("ISO27001".parse::<Framework>().unwrap(), Framework::Iso27001);
        assert!(matches!(
            "SOX".parse::<Framework>(),
            Err(ComplianceError::UnknownFramework(name)) if name == "SOX"
        ));
    }

    #[test]
    fn serde_uses_ids() {
        assert_eq!(serde_json::to_string(&Framework::PciDss).unwrap(), "\"PCI_DSS\"");
        let fw: Framework = serde_json::from_str("\"NIST\"").unwrap();
        assert_eq!(fw, Framework::Nist);
    }

    #[test]
    fn every_framework_has_categories() {
        for fw in Framework::ALL {
            assert!(!fw.categories().is_empty(), "{}", fw);
            assert!(!fw.requirements().is_empty(), "{}", fw);
        }
        assert_eq!(Framework::Nist.categories().len(), 5);
    }
}
