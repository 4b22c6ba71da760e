//! Shared-parameters XML of the global configuration: member and subsystem
//! enumeration.

use models::SubsystemId;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::Error;

/// All subsystems registered in the federation, in document order. Members
/// without a class or code (which would make an unaddressable identifier)
/// are skipped.
pub fn registered_subsystems(shared_params: &str) -> Result<Vec<SubsystemId>, Error> {
    let mut reader = Reader::from_str(shared_params);
    reader.trim_text(true);

    let mut path: Vec<String> = Vec::new();
    let mut instance = String::new();
    let mut member_class = String::new();
    let mut member_code = String::new();
    let mut subsystem_code = String::new();
    // (class, code, subsystem) collected before the instance is known.
    let mut found: Vec<(String, String, String)> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let local = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
                if path.len() == 1 && local == "member" {
                    member_class.clear();
                    member_code.clear();
                }
                path.push(local);
            }
            Ok(Event::Text(text)) => {
                let value = text
                    .unescape()
                    .map_err(|err| Error::Parse(format!("shared parameters: {err}")))?;
                match path_tail(&path).as_slice() {
                    ["instanceIdentifier"] => instance = value.into_owned(),
                    ["member", "memberClass", "code"] => member_class = value.into_owned(),
                    ["member", "memberCode"] => member_code = value.into_owned(),
                    ["member", "subsystem", "subsystemCode"] => {
                        subsystem_code = value.into_owned()
                    }
                    _ => {}
                }
            }
            Ok(Event::End(_)) => {
                if matches!(path_tail(&path).as_slice(), ["member", "subsystem"])
                    && !member_class.is_empty()
                    && !member_code.is_empty()
                    && !subsystem_code.is_empty()
                {
                    found.push((
                        member_class.clone(),
                        member_code.clone(),
                        std::mem::take(&mut subsystem_code),
                    ));
                }
                path.pop();
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(Error::Parse(format!("shared parameters: {err}"))),
        }
    }

    if instance.is_empty() {
        return Err(Error::Parse(
            "shared parameters have no instance identifier".to_string(),
        ));
    }

    Ok(found
        .into_iter()
        .map(|(class, code, subsystem)| SubsystemId::new(&instance, class, code, subsystem))
        .collect())
}

/// The path segments below the document root, for matching.
fn path_tail(path: &[String]) -> Vec<&str> {
    path.iter().skip(1).map(String::as_str).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SHARED_PARAMS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tns:conf xmlns:tns="http://x-road.eu/xsd/xroad.xsd" xmlns:id="http://x-road.eu/xsd/identifiers">
  <instanceIdentifier>XTEE</instanceIdentifier>
  <member>
    <memberClass>
      <code>GOV</code>
      <description>Government</description>
    </memberClass>
    <memberCode>123</memberCode>
    <name>Example agency</name>
    <subsystem>
      <subsystemCode>first</subsystemCode>
    </subsystem>
    <subsystem>
      <subsystemCode>second</subsystemCode>
    </subsystem>
  </member>
  <member>
    <memberClass>
      <code>COM</code>
    </memberClass>
    <memberCode>456</memberCode>
    <name>No subsystems here</name>
  </member>
  <securityServer>
    <owner>XTEE/GOV/123</owner>
    <serverCode>ss1</serverCode>
  </securityServer>
</tns:conf>"#;

    #[test]
    fn subsystems_in_document_order() {
        let subsystems = registered_subsystems(SHARED_PARAMS).unwrap();
        let paths: Vec<String> = subsystems.iter().map(SubsystemId::path).collect();
        assert_eq!(paths, vec!["XTEE/GOV/123/first", "XTEE/GOV/123/second"]);
    }

    #[test]
    fn missing_instance_is_an_error() {
        let err = registered_subsystems("<conf><member/></conf>").unwrap_err();
        assert!(err.to_string().contains("instance"));
    }
}
