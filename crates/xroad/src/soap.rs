//! SOAP plumbing for the X-Road metaservices: request envelopes, fault
//! detection, `listMethods` response parsing and the multipart `getWsdl`
//! response.

use models::{ClientId, ServiceId, SubsystemId};
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::Error;

/// Envelope for a metaservice call addressed to `producer`. `body` is the
/// request element placed inside the SOAP body.
pub(crate) fn request_envelope(
    client: &ClientId,
    producer: &SubsystemId,
    service_code: &str,
    body: &str,
) -> String {
    let client_object_type = if client.subsystem_code.is_some() {
        "SUBSYSTEM"
    } else {
        "MEMBER"
    };
    let client_subsystem = match &client.subsystem_code {
        Some(code) => format!("<id:subsystemCode>{}</id:subsystemCode>", escape(code)),
        None => String::new(),
    };

    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/"
        xmlns:xrd="http://x-road.eu/xsd/xroad.xsd"
        xmlns:id="http://x-road.eu/xsd/identifiers">
    <SOAP-ENV:Header>
        <xrd:client id:objectType="{client_object_type}">
            <id:xRoadInstance>{client_instance}</id:xRoadInstance>
            <id:memberClass>{client_class}</id:memberClass>
            <id:memberCode>{client_code}</id:memberCode>
            {client_subsystem}
        </xrd:client>
        <xrd:service id:objectType="SERVICE">
            <id:xRoadInstance>{instance}</id:xRoadInstance>
            <id:memberClass>{class}</id:memberClass>
            <id:memberCode>{code}</id:memberCode>
            <id:subsystemCode>{subsystem}</id:subsystemCode>
            <id:serviceCode>{service_code}</id:serviceCode>
        </xrd:service>
        <xrd:id>{id}</xrd:id>
        <xrd:protocolVersion>4.0</xrd:protocolVersion>
    </SOAP-ENV:Header>
    <SOAP-ENV:Body>
        {body}
    </SOAP-ENV:Body>
</SOAP-ENV:Envelope>"#,
        client_instance = escape(&client.x_road_instance),
        client_class = escape(&client.member_class),
        client_code = escape(&client.member_code),
        instance = escape(&producer.x_road_instance),
        class = escape(&producer.member_class),
        code = escape(&producer.member_code),
        subsystem = escape(&producer.subsystem_code),
        id = uuid::Uuid::new_v4(),
    )
}

/// Return the fault string when the response carries a SOAP fault.
pub(crate) fn fault(response: &str) -> Result<Option<String>, Error> {
    let mut reader = Reader::from_str(response);
    reader.trim_text(true);

    let mut in_faultstring = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                if start.local_name().as_ref() == b"faultstring" {
                    in_faultstring = true;
                }
            }
            Ok(Event::Text(text)) if in_faultstring => {
                let value = text
                    .unescape()
                    .map_err(|err| Error::Parse(format!("SOAP fault: {err}")))?;
                return Ok(Some(value.into_owned()));
            }
            Ok(Event::End(end)) => {
                if end.local_name().as_ref() == b"faultstring" {
                    // An empty faultstring is still a fault.
                    return Ok(Some(String::new()));
                }
            }
            Ok(Event::Eof) => return Ok(None),
            Ok(_) => {}
            Err(err) => return Err(Error::Parse(format!("SOAP response: {err}"))),
        }
    }
}

/// Parse the service identifiers out of a `listMethods` response.
pub(crate) fn parse_service_list(response: &str) -> Result<Vec<ServiceId>, Error> {
    if let Some(fault) = fault(response)? {
        return Err(Error::Fault(fault));
    }

    let mut reader = Reader::from_str(response);
    reader.trim_text(true);

    let mut services = Vec::new();
    let mut in_service = false;
    let mut field: Option<String> = None;
    let mut parts: std::collections::HashMap<String, String> = std::collections::HashMap::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let local = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
                if local == "service" {
                    in_service = true;
                    parts.clear();
                } else if in_service {
                    field = Some(local);
                }
            }
            Ok(Event::Text(text)) => {
                if let Some(field) = &field {
                    let value = text
                        .unescape()
                        .map_err(|err| Error::Parse(format!("listMethods response: {err}")))?;
                    parts.insert(field.clone(), value.into_owned());
                }
            }
            Ok(Event::End(end)) => {
                let local = end.local_name();
                if local.as_ref() == b"service" {
                    in_service = false;
                    services.push(service_from_parts(&parts)?);
                    parts.clear();
                } else {
                    field = None;
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(Error::Parse(format!("listMethods response: {err}"))),
        }
    }

    Ok(services)
}

fn service_from_parts(
    parts: &std::collections::HashMap<String, String>,
) -> Result<ServiceId, Error> {
    let get = |key: &str| {
        parts.get(key).cloned().ok_or_else(|| {
            Error::Parse(format!("listMethods service is missing {key}"))
        })
    };
    Ok(ServiceId::new(
        SubsystemId::new(
            get("xRoadInstance")?,
            get("memberClass")?,
            get("memberCode")?,
            get("subsystemCode")?,
        ),
        get("serviceCode")?,
        parts.get("serviceVersion").cloned(),
    ))
}

/// Pull the WSDL attachment out of a `getWsdl` response. The Security Server
/// answers with a multipart/related message whose first part is the SOAP
/// response and whose second part is the document itself; a plain SOAP
/// response is a fault.
pub(crate) fn extract_wsdl(content_type: &str, body: &[u8]) -> Result<String, Error> {
    if !content_type
        .to_ascii_lowercase()
        .starts_with("multipart/related")
    {
        let text = String::from_utf8_lossy(body);
        if let Some(fault) = fault(&text)? {
            return Err(Error::Fault(fault));
        }
        return Err(Error::Parse(
            "getWsdl response carries no WSDL attachment".to_string(),
        ));
    }

    let boundary = boundary(content_type).ok_or_else(|| {
        Error::Parse("multipart response without a boundary".to_string())
    })?;
    let delimiter = format!("--{boundary}");

    let text = String::from_utf8_lossy(body);
    let mut parts = text.split(delimiter.as_str()).skip(1).filter_map(part_body);

    // First part is the SOAP response referencing the attachment.
    let soap_part = parts
        .next()
        .ok_or_else(|| Error::Parse("multipart response has no SOAP part".to_string()))?;
    if let Some(fault) = fault(&soap_part)? {
        return Err(Error::Fault(fault));
    }
    match parts.next() {
        Some(wsdl) => Ok(wsdl),
        None => Err(Error::Parse(
            "getWsdl response carries no WSDL attachment".to_string(),
        )),
    }
}

fn boundary(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|param| {
        let (key, value) = param.trim().split_once('=')?;
        if key.eq_ignore_ascii_case("boundary") {
            Some(value.trim_matches('"').to_string())
        } else {
            None
        }
    })
}

/// The content of one MIME part: everything after its header block, with the
/// trailing newline and closing `--` marker removed.
fn part_body(part: &str) -> Option<String> {
    if part == "--" || part.trim().is_empty() {
        return None;
    }
    let part = part.strip_prefix("\r\n").or_else(|| part.strip_prefix('\n'))?;
    let body = match part.split_once("\r\n\r\n") {
        Some((_headers, body)) => body,
        None => part.split_once("\n\n")?.1,
    };
    let body = body.strip_suffix("--").unwrap_or(body);
    Some(body.trim_end_matches(['\r', '\n']).to_string())
}
