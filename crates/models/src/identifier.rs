use std::fmt;

/// Convert an identifier in the form of a segment sequence into its string
/// path representation. It is assumed that no symbols forbidden by storage
/// backends are used in identifiers; federation hygiene is upstream's job.
pub fn identifier_path<I, S>(segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    segments
        .into_iter()
        .map(|s| s.as_ref().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug, thiserror::Error)]
#[error("invalid {kind} identifier {path:?}: expected {expected} segments, found {found}")]
pub struct ParseIdError {
    pub kind: &'static str,
    pub path: String,
    pub expected: &'static str,
    pub found: usize,
}

impl ParseIdError {
    fn new(kind: &'static str, path: &str, expected: &'static str, found: usize) -> Self {
        Self {
            kind,
            path: path.to_string(),
            expected,
            found,
        }
    }
}

/// Identifier of the client on whose behalf metaservice requests are made.
/// Three segments identify a member, four a subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientId {
    pub x_road_instance: String,
    pub member_class: String,
    pub member_code: String,
    pub subsystem_code: Option<String>,
}

impl ClientId {
    pub fn from_segments(segments: &[String]) -> Result<Self, ParseIdError> {
        match segments {
            [instance, class, code] => Ok(Self {
                x_road_instance: instance.clone(),
                member_class: class.clone(),
                member_code: code.clone(),
                subsystem_code: None,
            }),
            [instance, class, code, subsystem] => Ok(Self {
                x_road_instance: instance.clone(),
                member_class: class.clone(),
                member_code: code.clone(),
                subsystem_code: Some(subsystem.clone()),
            }),
            other => Err(ParseIdError::new(
                "client",
                &identifier_path(other),
                "3 or 4",
                other.len(),
            )),
        }
    }

    pub fn segments(&self) -> Vec<&str> {
        let mut segments = vec![
            self.x_road_instance.as_str(),
            self.member_class.as_str(),
            self.member_code.as_str(),
        ];
        if let Some(subsystem) = &self.subsystem_code {
            segments.push(subsystem);
        }
        segments
    }

    pub fn path(&self) -> String {
        identifier_path(self.segments())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Identifier of a registered subsystem: the unit of collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubsystemId {
    pub x_road_instance: String,
    pub member_class: String,
    pub member_code: String,
    pub subsystem_code: String,
}

impl SubsystemId {
    pub fn new(
        instance: impl Into<String>,
        member_class: impl Into<String>,
        member_code: impl Into<String>,
        subsystem_code: impl Into<String>,
    ) -> Self {
        Self {
            x_road_instance: instance.into(),
            member_class: member_class.into(),
            member_code: member_code.into(),
            subsystem_code: subsystem_code.into(),
        }
    }

    pub fn parse(path: &str) -> Result<Self, ParseIdError> {
        let segments: Vec<&str> = path.split('/').collect();
        match segments.as_slice() {
            [instance, class, code, subsystem] => {
                Ok(Self::new(*instance, *class, *code, *subsystem))
            }
            other => Err(ParseIdError::new("subsystem", path, "4", other.len())),
        }
    }

    pub fn segments(&self) -> [&str; 4] {
        [
            &self.x_road_instance,
            &self.member_class,
            &self.member_code,
            &self.subsystem_code,
        ]
    }

    pub fn path(&self) -> String {
        identifier_path(self.segments())
    }
}

impl fmt::Display for SubsystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Identifier of a single service offered by a subsystem. SOAP services carry
/// a version as the sixth segment; REST services have five segments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceId {
    pub subsystem: SubsystemId,
    pub service_code: String,
    pub service_version: Option<String>,
}

impl ServiceId {
    pub fn new(subsystem: SubsystemId, code: impl Into<String>, version: Option<String>) -> Self {
        Self {
            subsystem,
            service_code: code.into(),
            service_version: version,
        }
    }

    pub fn parse(path: &str) -> Result<Self, ParseIdError> {
        let segments: Vec<&str> = path.split('/').collect();
        match segments.as_slice() {
            [instance, class, code, subsystem, service] => Ok(Self::new(
                SubsystemId::new(*instance, *class, *code, *subsystem),
                *service,
                None,
            )),
            [instance, class, code, subsystem, service, version] => Ok(Self::new(
                SubsystemId::new(*instance, *class, *code, *subsystem),
                *service,
                Some(version.to_string()),
            )),
            other => Err(ParseIdError::new("service", path, "5 or 6", other.len())),
        }
    }

    pub fn segments(&self) -> Vec<&str> {
        let mut segments = self.subsystem.segments().to_vec();
        segments.push(&self.service_code);
        if let Some(version) = &self.service_version {
            segments.push(version);
        }
        segments
    }

    pub fn path(&self) -> String {
        identifier_path(self.segments())
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn join_and_display() {
        assert_eq!(identifier_path(["XTEE", "GOV", "123", "sub"]), "XTEE/GOV/123/sub");
        let subsystem = SubsystemId::new("XTEE", "GOV", "123", "sub");
        assert_eq!(subsystem.to_string(), "XTEE/GOV/123/sub");

        let service = ServiceId::new(subsystem.clone(), "getData", Some("v1".to_string()));
        assert_eq!(service.path(), "XTEE/GOV/123/sub/getData/v1");

        let rest = ServiceId::new(subsystem, "pets", None);
        assert_eq!(rest.path(), "XTEE/GOV/123/sub/pets");
    }

    #[test]
    fn parse_round_trip() {
        let subsystem = SubsystemId::parse("XTEE/GOV/123/sub").unwrap();
        assert_eq!(subsystem, SubsystemId::new("XTEE", "GOV", "123", "sub"));
        assert!(SubsystemId::parse("XTEE/GOV/123").is_err());
        assert!(SubsystemId::parse("XTEE/GOV/123/sub/extra").is_err());

        let service = ServiceId::parse("XTEE/GOV/123/sub/getData/v1").unwrap();
        assert_eq!(service.service_version.as_deref(), Some("v1"));
        assert!(ServiceId::parse("XTEE/GOV/123/sub").is_err());

        let client = ClientId::from_segments(&[
            "XTEE".to_string(),
            "GOV".to_string(),
            "123".to_string(),
        ])
        .unwrap();
        assert_eq!(client.path(), "XTEE/GOV/123");
        assert!(ClientId::from_segments(&["XTEE".to_string()]).is_err());
    }

    #[test]
    fn service_ordering_is_segment_lexicographic() {
        let subsystem = SubsystemId::new("XTEE", "GOV", "123", "sub");
        let mut services = vec![
            ServiceId::new(subsystem.clone(), "beta", Some("v2".to_string())),
            ServiceId::new(subsystem.clone(), "alpha", Some("v1".to_string())),
            ServiceId::new(subsystem.clone(), "beta", Some("v1".to_string())),
        ];
        services.sort();
        let codes: Vec<String> = services.iter().map(|s| s.path()).collect();
        assert_eq!(
            codes,
            vec![
                "XTEE/GOV/123/sub/alpha/v1",
                "XTEE/GOV/123/sub/beta/v1",
                "XTEE/GOV/123/sub/beta/v2",
            ]
        );
    }
}
