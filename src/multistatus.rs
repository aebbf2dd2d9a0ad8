//! RFC 4918 response bodies.
//!
//! Everything the gateway sends with a body is built here: the 207
//! multi-status for PROPFIND, the 404 multi-status, the PROPPATCH 207
//! empty-prop reply, and the empty-body status responses. Handlers build
//! exactly one response per request, so headers are never written twice.

use std::io::Write;

use http::{header, Response, StatusCode};
use xml::writer::{EmitterConfig, EventWriter, XmlEvent};

use crate::body::Body;
use crate::davpath::encode_href;
use crate::errors::DavResult;
use crate::resource::Resource;
use crate::sdk::StatFs;
use crate::util::{ms_to_httpdate, MemBuffer};

const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";

/// Empty response with the given status and `Content-Length: 0`.
pub(crate) fn empty_status(status: StatusCode) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_LENGTH, "0")
        .body(Body::empty())
        .unwrap()
}

/// 207 multi-status carrying the full property set of each resource.
pub(crate) fn multistatus(resources: &[Resource], statfs: StatFs) -> DavResult<Response<Body>> {
    let mut buf = MemBuffer::new();
    {
        let mut w = writer(&mut buf);
        w.write(XmlEvent::start_element("D:multistatus").ns("D", "DAV:"))?;
        for resource in resources {
            write_response(&mut w, resource, statfs)?;
        }
        w.write(XmlEvent::end_element())?;
    }
    xml_response(StatusCode::MULTI_STATUS, buf)
}

/// Multi-status envelope for a resource that is in no tier: empty prop,
/// `HTTP/1.1 404 NOT FOUND` inside, HTTP status 404 outside.
pub(crate) fn notfound_multistatus(href: &str) -> DavResult<Response<Body>> {
    empty_prop_multistatus(StatusCode::NOT_FOUND, href, "HTTP/1.1 404 NOT FOUND")
}

/// PROPPATCH reply: empty prop, 207 inside and out.
pub(crate) fn proppatch_multistatus(href: &str) -> DavResult<Response<Body>> {
    empty_prop_multistatus(StatusCode::MULTI_STATUS, href, "HTTP/1.1 207 Multi-Status")
}

fn empty_prop_multistatus(
    status: StatusCode,
    href: &str,
    inner_status: &str,
) -> DavResult<Response<Body>> {
    let mut buf = MemBuffer::new();
    {
        let mut w = writer(&mut buf);
        w.write(XmlEvent::start_element("D:multistatus").ns("D", "DAV:"))?;
        w.write(XmlEvent::start_element("D:response"))?;
        text_element(&mut w, "D:href", &encode_href(href))?;
        w.write(XmlEvent::start_element("D:propstat"))?;
        w.write(XmlEvent::start_element("D:prop"))?;
        w.write(XmlEvent::end_element())?;
        text_element(&mut w, "D:status", inner_status)?;
        w.write(XmlEvent::end_element())?;
        w.write(XmlEvent::end_element())?;
        w.write(XmlEvent::end_element())?;
    }
    xml_response(status, buf)
}

fn writer(buf: &mut MemBuffer) -> EventWriter<&mut MemBuffer> {
    EmitterConfig::new()
        .write_document_declaration(true)
        .perform_indent(false)
        .create_writer(buf)
}

fn write_response<W: Write>(
    w: &mut EventWriter<W>,
    resource: &Resource,
    statfs: StatFs,
) -> DavResult<()> {
    let is_dir = resource.is_dir();
    let contentlength = if is_dir { 0 } else { resource.size() };
    let contenttype = if is_dir {
        "httpd/unix-directory"
    } else {
        resource.mime()
    };

    w.write(XmlEvent::start_element("D:response"))?;
    text_element(w, "D:href", &encode_href(&resource.url()))?;
    w.write(XmlEvent::start_element("D:propstat"))?;
    w.write(XmlEvent::start_element("D:prop"))?;

    text_element(w, "D:getlastmodified", &ms_to_httpdate(resource.mtime_ms()))?;
    text_element(w, "D:displayname", &encode_href(resource.name()))?;
    text_element(w, "D:getcontentlength", &contentlength.to_string())?;
    text_element(w, "D:getetag", resource.uuid())?;
    text_element(w, "D:creationdate", &ms_to_httpdate(resource.birthtime_ms()))?;
    text_element(
        w,
        "D:quota-available-bytes",
        &statfs.max.saturating_sub(statfs.used).to_string(),
    )?;
    text_element(w, "D:quota-used-bytes", &statfs.used.to_string())?;
    text_element(w, "D:getcontenttype", contenttype)?;

    w.write(XmlEvent::start_element("D:resourcetype"))?;
    w.write(XmlEvent::start_element(if is_dir { "D:collection" } else { "D:file" }))?;
    w.write(XmlEvent::end_element())?;
    w.write(XmlEvent::end_element())?;

    w.write(XmlEvent::end_element())?; // D:prop
    text_element(w, "D:status", "HTTP/1.1 200 OK")?;
    w.write(XmlEvent::end_element())?; // D:propstat
    w.write(XmlEvent::end_element())?; // D:response
    Ok(())
}

fn text_element<W: Write>(w: &mut EventWriter<W>, name: &str, value: &str) -> DavResult<()> {
    w.write(XmlEvent::start_element(name))?;
    if !value.is_empty() {
        w.write(XmlEvent::characters(value))?;
    }
    w.write(XmlEvent::end_element())?;
    Ok(())
}

fn xml_response(status: StatusCode, mut buf: MemBuffer) -> DavResult<Response<Body>> {
    let bytes = buf.take();
    Ok(Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, XML_CONTENT_TYPE)
        .header(header::CONTENT_LENGTH, bytes.len().to_string())
        .body(Body::from(bytes))
        .unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::davpath::DavPath;
    use crate::resource::VirtualFile;

    fn body_string(res: Response<Body>) -> String {
        match res.into_body().inner {
            crate::body::BodyType::Bytes(Some(b)) => String::from_utf8(b.to_vec()).unwrap(),
            _ => panic!("expected buffered body"),
        }
    }

    #[test]
    fn multistatus_props() {
        let v = Resource::Virtual(VirtualFile::create(&DavPath::from_decoded("/a b.txt")));
        let res = multistatus(&[v], StatFs { used: 10, max: 110 }).unwrap();
        assert_eq!(res.status(), StatusCode::MULTI_STATUS);
        assert_eq!(
            res.headers()[header::CONTENT_TYPE],
            "application/xml; charset=utf-8"
        );
        let len: usize = res.headers()[header::CONTENT_LENGTH]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        let body = body_string(res);
        assert_eq!(len, body.len());
        assert!(body.contains(r#"<D:multistatus xmlns:D="DAV:">"#));
        assert!(body.contains("<D:href>/a%20b.txt</D:href>"));
        assert!(body.contains("<D:displayname>a%20b.txt</D:displayname>"));
        assert!(body.contains("<D:getcontentlength>0</D:getcontentlength>"));
        assert!(body.contains("<D:quota-available-bytes>100</D:quota-available-bytes>"));
        assert!(body.contains("<D:getcontenttype>text/plain</D:getcontenttype>"));
        assert!(body.contains("<D:file />") || body.contains("<D:file/>"));
        assert!(body.contains("<D:status>HTTP/1.1 200 OK</D:status>"));
    }

    #[test]
    fn notfound_envelope() {
        let res = notfound_multistatus("/gone").unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let body = body_string(res);
        assert!(body.contains("<D:status>HTTP/1.1 404 NOT FOUND</D:status>"));
        assert!(body.contains("<D:prop />") || body.contains("<D:prop/>"));
    }

    #[test]
    fn proppatch_envelope() {
        let res = proppatch_multistatus("/f.txt").unwrap();
        assert_eq!(res.status(), StatusCode::MULTI_STATUS);
        let body = body_string(res);
        assert!(body.contains("<D:status>HTTP/1.1 207 Multi-Status</D:status>"));
    }

    #[test]
    fn empty_statuses_carry_zero_length() {
        for code in [200u16, 201, 204, 400, 403, 412, 500, 501] {
            let res = empty_status(StatusCode::from_u16(code).unwrap());
            assert_eq!(res.headers()[header::CONTENT_LENGTH], "0");
        }
    }
}
