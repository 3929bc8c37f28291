use gloo_net::http::{Request, RequestBuilder};
use js_sys::{Array, Uint8Array};
use web_sys::{Blob, BlobPropertyBag, FormData, UrlSearchParams};

use trackitnow::api::{ApiRequest, ApiResponse, FilePart, Method, RequestBody, Transport};
use trackitnow::TransportError;

/// Browser fetch transport.
#[derive(Debug, Clone)]
pub struct GlooTransport {
    base_url: String,
}

impl GlooTransport {
    pub fn new(base_url: &str) -> Self {
        Self { base_url: base_url.trim_end_matches('/').to_string() }
    }

    /// Turns a server-relative path such as an avatar URL into an absolute one.
    pub fn resolve(&self, url: &str) -> String {
        if url.starts_with('/') { format!("{}{url}", self.base_url) } else { url.to_string() }
    }
}

impl Transport for GlooTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = match request.method {
            Method::Get => Request::get(&url),
            Method::Post => Request::post(&url),
            Method::Put => Request::put(&url),
            Method::Delete => Request::delete(&url),
        };
        if !request.query.is_empty() {
            builder = builder.query(request.query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        if let Some(authorization) = request.authorization() {
            builder = builder.header("Authorization", &authorization);
        }

        let prepared = with_body(builder, request.body)?;
        let resp = prepared.send().await.map_err(|e| TransportError::new(format!("Network error: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| TransportError::new(format!("Failed to read response: {e}")))?;
        Ok(ApiResponse { status, body })
    }
}

fn with_body(builder: RequestBuilder, body: RequestBody) -> Result<Request, TransportError> {
    let prepared = match body {
        RequestBody::Empty => builder.build(),
        RequestBody::Json(value) => builder.json(&value),
        RequestBody::Form(pairs) => {
            let params = UrlSearchParams::new().map_err(js_error)?;
            for (key, value) in &pairs {
                params.append(key, value);
            }
            builder.body(params)
        }
        RequestBody::Multipart(file) => builder.body(form_data(&file)?),
    };
    prepared.map_err(|e| TransportError::new(format!("Failed to build request: {e}")))
}

fn form_data(file: &FilePart) -> Result<FormData, TransportError> {
    let bytes = Uint8Array::from(file.bytes.as_slice());
    let parts = Array::of1(&bytes);
    let options = BlobPropertyBag::new();
    options.set_type(&file.mime);
    let blob = Blob::new_with_u8_array_sequence_and_options(&parts, &options).map_err(js_error)?;

    let form = FormData::new().map_err(js_error)?;
    form.append_with_blob_and_filename(&file.field, &blob, &file.file_name)
        .map_err(js_error)?;
    Ok(form)
}

fn js_error(value: wasm_bindgen::JsValue) -> TransportError {
    TransportError::new(format!("Browser error: {value:?}"))
}
