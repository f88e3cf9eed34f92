use std::io::{self, SeekFrom};
use std::path::PathBuf;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::warn;

/// Equivalente a `tail -f`: devuelve las líneas completas nuevas de cada pasada.
pub struct LogFollower {
    path: PathBuf,
    offset: u64,
    // bytes de una línea todavía incompleta (puede cortar un carácter UTF-8)
    partial: Vec<u8>,
}

impl LogFollower {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            offset: 0,
            partial: Vec::new(),
        }
    }

    pub async fn poll(&mut self) -> io::Result<Vec<String>> {
        let mut file = match File::open(&self.path).await {
            Ok(f) => f,
            // todavía no existe: esrallyd no escribió nada
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let len = file.metadata().await?.len();
        if len < self.offset {
            // el archivo fue truncado, empezamos de nuevo
            self.offset = 0;
            self.partial.clear();
        }
        if len == self.offset {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(self.offset)).await?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await?;
        self.offset += buf.len() as u64;
        self.partial.extend_from_slice(&buf);

        let mut lines = Vec::new();
        while let Some(pos) = self.partial.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.partial.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            lines.push(line.trim_end_matches(|c| c == '\n' || c == '\r').to_string());
        }
        Ok(lines)
    }
}

/// Sigue el log en segundo plano y lo vuelca a stdout del contenedor.
pub fn spawn(path: PathBuf, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut follower = LogFollower::new(path);
        loop {
            match follower.poll().await {
                Ok(lines) => {
                    for line in lines {
                        println!("{}", line);
                    }
                }
                Err(e) => warn!("error leyendo {}: {:?}", follower.path.display(), e),
            }
            sleep(interval).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs, io::Write, path::PathBuf};

    fn temp_dir(sub: &str) -> PathBuf {
        let base = env::temp_dir().join("tail_tests").join(sub);
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();
        base
    }

    fn append(path: &PathBuf, text: &str) {
        let mut f = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        f.write_all(text.as_bytes()).unwrap();
    }

    #[tokio::test]
    async fn archivo_inexistente_no_es_error() {
        let dir = temp_dir("inexistente");
        let mut follower = LogFollower::new(dir.join("rally.log"));
        assert!(follower.poll().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn devuelve_solo_lineas_nuevas_y_completas() {
        let dir = temp_dir("nuevas");
        let path = dir.join("rally.log");
        append(&path, "uno\ndos\ntr");

        let mut follower = LogFollower::new(path.clone());
        assert_eq!(follower.poll().await.unwrap(), vec!["uno", "dos"]);
        assert!(follower.poll().await.unwrap().is_empty());

        append(&path, "es\r\ncuatro\n");
        assert_eq!(follower.poll().await.unwrap(), vec!["tres", "cuatro"]);
    }

    #[tokio::test]
    async fn caracter_multibyte_partido_entre_lecturas() {
        let dir = temp_dir("utf8");
        let path = dir.join("rally.log");
        let text = "señal\n".as_bytes();
        // corta en medio de la "ñ" (0xC3 0xB1)
        let cut = 3;

        fs::write(&path, &text[..cut]).unwrap();
        let mut follower = LogFollower::new(path.clone());
        assert!(follower.poll().await.unwrap().is_empty());

        let mut f = fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(&text[cut..]).unwrap();
        assert_eq!(follower.poll().await.unwrap(), vec!["señal"]);
    }

    #[tokio::test]
    async fn truncado_vuelve_al_principio() {
        let dir = temp_dir("truncado");
        let path = dir.join("rally.log");
        append(&path, "linea vieja bastante larga\n");

        let mut follower = LogFollower::new(path.clone());
        assert_eq!(follower.poll().await.unwrap().len(), 1);

        fs::write(&path, "nueva\n").unwrap();
        assert_eq!(follower.poll().await.unwrap(), vec!["nueva"]);
    }
}
