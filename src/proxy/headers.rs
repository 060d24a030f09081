use http::{HeaderMap, HeaderName, header};

/// Remove hop by hop headers from a request before it is forwarded upstream.
///
/// Headers named in the `Connection` header are removed as well.
pub(crate) fn remove_hop_by_hop_request_headers(headers: &mut HeaderMap) {
    remove_connection_listed_headers(headers);
    for name in [
        header::CONNECTION,
        HeaderName::from_static("proxy-connection"),
        HeaderName::from_static("keep-alive"),
        header::PROXY_AUTHORIZATION,
        header::TE,
        header::TRAILER,
        header::TRANSFER_ENCODING,
        header::UPGRADE,
    ] {
        if headers.remove(&name).is_some() {
            tracing::trace!(header = %name, "removed hop-by-hop request header");
        }
    }
}

/// Remove hop by hop headers from an upstream response before it is returned to the client.
pub(crate) fn remove_hop_by_hop_response_headers(headers: &mut HeaderMap) {
    remove_connection_listed_headers(headers);
    for name in [
        header::CONNECTION,
        HeaderName::from_static("keep-alive"),
        header::PROXY_AUTHENTICATE,
        header::TRAILER,
        header::TRANSFER_ENCODING,
        header::UPGRADE,
    ] {
        if headers.remove(&name).is_some() {
            tracing::trace!(header = %name, "removed hop-by-hop response header");
        }
    }
}

fn remove_connection_listed_headers(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        if headers.remove(&name).is_some() {
            tracing::trace!(header = %name, "removed header listed in Connection header");
        }
    }
}
