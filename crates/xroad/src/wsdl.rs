//! Extraction of operation names and versions from a WSDL document.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::Error;

/// Operations advertised by a WSDL, as `(serviceCode, serviceVersion)` pairs
/// in document order. The X-Road service version is the `xrd:version` child
/// of the binding operation; an operation without one gets an empty version.
///
/// A single WSDL regularly describes several operations.
pub fn wsdl_methods(wsdl: &str) -> Result<Vec<(String, String)>, Error> {
    let mut reader = Reader::from_str(wsdl);
    reader.trim_text(true);

    let mut methods: Vec<(String, String)> = Vec::new();
    let mut depth: usize = 0;
    let mut binding_depth: Option<usize> = None;
    let mut operation_name: Option<String> = None;
    let mut version = String::new();
    let mut in_version = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                depth += 1;
                match start.local_name().as_ref() {
                    b"binding" if binding_depth.is_none() => binding_depth = Some(depth),
                    // Only operations that are direct children of the binding
                    // count; soap:operation elements nest one level deeper.
                    b"operation" if binding_depth == Some(depth - 1) => {
                        let name = start
                            .try_get_attribute("name")
                            .map_err(|err| Error::Parse(format!("WSDL: {err}")))?
                            .map(|attr| {
                                attr.unescape_value()
                                    .map(|value| value.into_owned())
                                    .map_err(|err| Error::Parse(format!("WSDL: {err}")))
                            })
                            .transpose()?;
                        operation_name = name;
                        version.clear();
                    }
                    b"version" if operation_name.is_some() => in_version = true,
                    _ => {}
                }
            }
            Ok(Event::Text(text)) => {
                if in_version {
                    version = text
                        .unescape()
                        .map_err(|err| Error::Parse(format!("WSDL: {err}")))?
                        .into_owned();
                }
            }
            Ok(Event::End(end)) => {
                match end.local_name().as_ref() {
                    b"version" => in_version = false,
                    b"operation" if binding_depth == Some(depth - 1) => {
                        if let Some(name) = operation_name.take() {
                            methods.push((name, std::mem::take(&mut version)));
                        }
                    }
                    b"binding" if binding_depth == Some(depth) => binding_depth = None,
                    _ => {}
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(Error::Parse(format!("WSDL: {err}"))),
        }
    }

    Ok(methods)
}
