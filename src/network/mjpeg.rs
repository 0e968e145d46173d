use tokio::io::{AsyncWrite, AsyncWriteExt};

pub const BOUNDARY: &str = "frame";

pub fn response_head() -> String {
    format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: multipart/x-mixed-replace; boundary={}\r\n\
         Cache-Control: no-cache\r\n\
         Connection: close\r\n\r\n",
        BOUNDARY
    )
}

pub fn error_response(status: &str, message: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\n\
         Content-Type: text/plain\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n{}",
        status,
        message.len(),
        message
    )
}

/// Writes one JPEG as a multipart part.
pub async fn write_part<W>(writer: &mut W, jpeg: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY,
        jpeg.len()
    );
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(jpeg).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn part_carries_length_and_boundary() {
        let mut out = Vec::new();
        write_part(&mut out, &[0xFF, 0xD8, 0xFF, 0xD9]).await.unwrap();
        let header_end = out.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
        let header = std::str::from_utf8(&out[..header_end]).unwrap();
        assert!(header.starts_with("--frame\r\n"));
        assert!(header.contains("Content-Length: 4\r\n"));
        assert_eq!(&out[header_end..], &[0xFF, 0xD8, 0xFF, 0xD9, b'\r', b'\n']);
    }

    #[test]
    fn head_announces_the_boundary() {
        assert!(response_head().contains("multipart/x-mixed-replace; boundary=frame"));
        assert!(error_response("404 Not Found", "nope").ends_with("\r\n\r\nnope"));
    }
}
