use std::io::{Cursor, Write};
use std::net::SocketAddr;
use std::path::Path;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::transform::{self, CanvasGeometry};

/// Generous cap so a full camera-roll batch fits in one request.
const MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

const ARCHIVE_NAME: &str = "resized_images.zip";

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("multipart error: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

#[derive(Clone)]
struct ServerState {
    geometry: CanvasGeometry,
}

/// Run the upload form server until the process is stopped.
pub async fn serve(port: u16, geometry: CanvasGeometry) -> Result<(), ServerError> {
    let app = Router::new()
        .route("/", get(index))
        .route("/process", post(process_images))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(ServerState { geometry });

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("🖼 Canvas resizer listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn process_images(State(state): State<ServerState>, multipart: Multipart) -> Response {
    match collect_upload(state.geometry, multipart).await {
        Ok((files, geometry)) => {
            println!(
                "📥 Processing {} uploaded file(s) onto {}x{}",
                files.len(),
                geometry.canvas_width,
                geometry.canvas_height
            );
            match build_archive(&files, &geometry) {
                Ok(archive) => (
                    [
                        (header::CONTENT_TYPE, "application/zip".to_string()),
                        (
                            header::CONTENT_DISPOSITION,
                            format!("attachment; filename=\"{ARCHIVE_NAME}\""),
                        ),
                    ],
                    archive,
                )
                    .into_response(),
                Err(e) => {
                    log::error!("failed to build archive: {}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
                }
            }
        }
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

/// Pull the uploaded files and geometry overrides out of the form.
/// Unparseable numeric fields keep the server's configured defaults.
async fn collect_upload(
    mut geometry: CanvasGeometry,
    mut multipart: Multipart,
) -> Result<(Vec<(String, Vec<u8>)>, CanvasGeometry), ServerError> {
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if name == "files" {
            let file_name = field.file_name().unwrap_or("upload").to_string();
            let bytes = field.bytes().await?;
            files.push((file_name, bytes.to_vec()));
        } else {
            let value = field.text().await?;
            apply_geometry_field(&mut geometry, &name, &value);
        }
    }

    Ok((files, geometry))
}

fn apply_geometry_field(geometry: &mut CanvasGeometry, name: &str, value: &str) {
    let Ok(parsed) = value.trim().parse::<u32>() else {
        log::warn!("ignoring unparseable form field {}={:?}", name, value);
        return;
    };
    match name {
        "canvasWidth" => geometry.canvas_width = parsed,
        "canvasHeight" => geometry.canvas_height = parsed,
        "verticalPadding" => geometry.vertical_padding = parsed,
        "horizontalPadding" => geometry.horizontal_padding = parsed,
        other => log::warn!("ignoring unknown form field {}", other),
    }
}

/// Transform each upload and write the JPEGs into an in-memory deflate
/// archive as `<stem>.jpg`. Files that fail to decode or transform are
/// logged and left out; the archive itself is returned even when empty.
fn build_archive(
    files: &[(String, Vec<u8>)],
    geometry: &CanvasGeometry,
) -> Result<Vec<u8>, ServerError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (file_name, bytes) in files {
        match transform::process_bytes(bytes, file_name, geometry) {
            Ok(jpeg) => {
                let stem = Path::new(file_name)
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| "image".to_string());
                writer.start_file(format!("{stem}.jpg"), options)?;
                writer.write_all(&jpeg)?;
            }
            Err(e) => {
                log::warn!("skipping {}: {}", file_name, e);
                eprintln!("⚠ Skipping {}: {}", file_name, e);
            }
        }
    }

    Ok(writer.finish()?.into_inner())
}

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html>
<head>
    <title>Canvas Image Resizer</title>
    <style>
        * { margin: 0; padding: 0; box-sizing: border-box; }
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Oxygen, Ubuntu, sans-serif;
            background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
            min-height: 100vh;
            padding: 20px;
        }
        .container {
            max-width: 800px;
            margin: 0 auto;
            background: white;
            border-radius: 20px;
            padding: 40px;
            box-shadow: 0 20px 60px rgba(0,0,0,0.3);
        }
        h1 { color: #333; margin-bottom: 30px; text-align: center; }
        .settings {
            display: grid;
            grid-template-columns: 1fr 1fr;
            gap: 20px;
            margin-bottom: 30px;
            padding: 20px;
            background: #f8f9fa;
            border-radius: 10px;
        }
        .setting-group { display: flex; flex-direction: column; }
        label { font-weight: 600; margin-bottom: 5px; color: #555; font-size: 14px; }
        input[type="number"] {
            padding: 10px;
            border: 2px solid #e0e0e0;
            border-radius: 8px;
            font-size: 16px;
        }
        input[type="number"]:focus { outline: none; border-color: #667eea; }
        .drop-zone {
            border: 3px dashed #ccc;
            border-radius: 15px;
            padding: 60px 20px;
            text-align: center;
            cursor: pointer;
            background: #fafafa;
        }
        .drop-zone:hover, .drop-zone.dragover { border-color: #667eea; background: #f0f4ff; }
        .drop-zone p { color: #666; font-size: 18px; margin-bottom: 10px; }
        .drop-zone small { color: #999; font-size: 14px; }
        #fileInput { display: none; }
        .file-list { margin-top: 20px; }
        .file-item {
            padding: 12px;
            background: #f8f9fa;
            border-radius: 8px;
            margin-bottom: 8px;
            display: flex;
            justify-content: space-between;
            align-items: center;
        }
        .btn {
            padding: 15px 30px;
            border: none;
            border-radius: 10px;
            font-size: 16px;
            font-weight: 600;
            cursor: pointer;
            width: 100%;
            margin-top: 20px;
        }
        .btn-primary {
            background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
            color: white;
        }
        .btn-primary:disabled { background: #ccc; cursor: not-allowed; }
        .progress { display: none; margin-top: 20px; text-align: center; }
        .spinner {
            border: 4px solid #f3f3f3;
            border-top: 4px solid #667eea;
            border-radius: 50%;
            width: 40px;
            height: 40px;
            animation: spin 1s linear infinite;
            margin: 0 auto 10px;
        }
        @keyframes spin {
            0% { transform: rotate(0deg); }
            100% { transform: rotate(360deg); }
        }
    </style>
</head>
<body>
    <div class="container">
        <h1>🖼️ Canvas Image Resizer</h1>

        <div class="settings">
            <div class="setting-group">
                <label for="canvasWidth">Canvas Width (px)</label>
                <input type="number" id="canvasWidth" value="1080" min="1">
            </div>
            <div class="setting-group">
                <label for="canvasHeight">Canvas Height (px)</label>
                <input type="number" id="canvasHeight" value="1350" min="1">
            </div>
            <div class="setting-group">
                <label for="verticalPadding">Vertical Padding (px)</label>
                <input type="number" id="verticalPadding" value="32" min="0">
            </div>
            <div class="setting-group">
                <label for="horizontalPadding">Horizontal Padding (px)</label>
                <input type="number" id="horizontalPadding" value="114" min="0">
            </div>
        </div>

        <div class="drop-zone" id="dropZone">
            <p>📁 Drag &amp; drop images here</p>
            <small>or click to browse</small>
            <input type="file" id="fileInput" multiple accept="image/*,.heic,.heif">
        </div>

        <div class="file-list" id="fileList"></div>

        <button class="btn btn-primary" id="processBtn" disabled>Process Images</button>

        <div class="progress" id="progress">
            <div class="spinner"></div>
            <p>Processing images...</p>
        </div>
    </div>

    <script>
        const dropZone = document.getElementById('dropZone');
        const fileInput = document.getElementById('fileInput');
        const fileList = document.getElementById('fileList');
        const processBtn = document.getElementById('processBtn');
        const progress = document.getElementById('progress');
        let selectedFiles = [];

        dropZone.addEventListener('click', () => fileInput.click());

        dropZone.addEventListener('dragover', (e) => {
            e.preventDefault();
            dropZone.classList.add('dragover');
        });

        dropZone.addEventListener('dragleave', () => {
            dropZone.classList.remove('dragover');
        });

        dropZone.addEventListener('drop', (e) => {
            e.preventDefault();
            dropZone.classList.remove('dragover');
            handleFiles(e.dataTransfer.files);
        });

        fileInput.addEventListener('change', (e) => {
            handleFiles(e.target.files);
        });

        function handleFiles(files) {
            selectedFiles = Array.from(files);
            displayFiles();
            processBtn.disabled = selectedFiles.length === 0;
        }

        function displayFiles() {
            fileList.innerHTML = '';
            selectedFiles.forEach((file) => {
                const div = document.createElement('div');
                div.className = 'file-item';
                div.innerHTML = `
                    <span>${file.name}</span>
                    <span style="color: #999;">${(file.size / 1024 / 1024).toFixed(2)} MB</span>
                `;
                fileList.appendChild(div);
            });
        }

        processBtn.addEventListener('click', async () => {
            if (selectedFiles.length === 0) return;

            const formData = new FormData();
            selectedFiles.forEach(file => formData.append('files', file));
            formData.append('canvasWidth', document.getElementById('canvasWidth').value);
            formData.append('canvasHeight', document.getElementById('canvasHeight').value);
            formData.append('verticalPadding', document.getElementById('verticalPadding').value);
            formData.append('horizontalPadding', document.getElementById('horizontalPadding').value);

            processBtn.disabled = true;
            progress.style.display = 'block';

            try {
                const response = await fetch('/process', {
                    method: 'POST',
                    body: formData
                });

                if (response.ok) {
                    const blob = await response.blob();
                    const url = window.URL.createObjectURL(blob);
                    const a = document.createElement('a');
                    a.href = url;
                    a.download = 'resized_images.zip';
                    a.click();
                    window.URL.revokeObjectURL(url);
                } else {
                    alert('Error processing images');
                }
            } catch (error) {
                alert('Error: ' + error.message);
            } finally {
                progress.style.display = 'none';
                processBtn.disabled = false;
            }
        });
    </script>
</body>
</html>
"##;
