//! Client for the elevator server (the lab hardware bridge or the course simulator).
//!
//! Every message is four bytes, reads answer with four bytes back. A stalled
//! server fails the exchange after [config::ELEV_IO_TIMEOUT].

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};

use log::error;

use crate::config;

use super::{ButtonType, Direction, ElevatorIo};

/// TCP connection to an elevator server.
#[derive(Debug)]
pub struct ElevatorServer {
    socket: TcpStream,
    /// Number of floors served by the car
    pub num_floors: u8,
}

impl ElevatorServer {
    /// Connects to the server at `addr`.
    pub fn init(addr: &str, num_floors: u8) -> io::Result<Self> {
        let socket = TcpStream::connect(addr)?;
        socket.set_nodelay(true)?;
        socket.set_read_timeout(Some(config::ELEV_IO_TIMEOUT))?;
        socket.set_write_timeout(Some(config::ELEV_IO_TIMEOUT))?;
        Ok(Self { socket, num_floors })
    }

    fn write(&mut self, buf: [u8; 4]) -> io::Result<()> {
        self.socket.write_all(&buf)
    }

    fn query(&mut self, buf: [u8; 4]) -> io::Result<[u8; 4]> {
        let mut reply = [0u8; 4];
        let result = self
            .socket
            .write_all(&buf)
            .and_then(|_| self.socket.read_exact(&mut reply));
        if let Err(e) = result {
            // a late reply would answer the next query, the connection is done
            error!("elevator server exchange failed: {}", e);
            let _ = self.socket.shutdown(Shutdown::Both);
            return Err(e);
        }
        Ok(reply)
    }
}

impl ElevatorIo for ElevatorServer {
    fn motor_direction(&mut self, dirn: Direction) -> io::Result<()> {
        let code = match dirn {
            Direction::None => 0u8,
            Direction::Up => 1u8,
            Direction::Down => u8::MAX,
        };
        self.write([1, code, 0, 0])
    }

    fn call_button_light(&mut self, button_type: ButtonType, floor: u8, on: bool) -> io::Result<()> {
        self.write([2, button_type as u8, floor, on as u8])
    }

    fn floor_indicator(&mut self, floor: u8) -> io::Result<()> {
        self.write([3, floor, 0, 0])
    }

    fn door_light(&mut self, on: bool) -> io::Result<()> {
        self.write([4, on as u8, 0, 0])
    }

    fn stop_button_light(&mut self, on: bool) -> io::Result<()> {
        self.write([5, on as u8, 0, 0])
    }

    fn call_button(&mut self, button_type: ButtonType, floor: u8) -> io::Result<bool> {
        let reply = self.query([6, button_type as u8, floor, 0])?;
        Ok(reply[1] != 0)
    }

    fn floor_sensor(&mut self) -> io::Result<Option<u8>> {
        let reply = self.query([7, 0, 0, 0])?;
        Ok((reply[1] != 0).then_some(reply[2]))
    }

    fn stop_button(&mut self) -> io::Result<bool> {
        let reply = self.query([8, 0, 0, 0])?;
        Ok(reply[1] != 0)
    }

    fn obstruction(&mut self) -> io::Result<bool> {
        let reply = self.query([9, 0, 0, 0])?;
        Ok(reply[1] != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn speaks_the_four_byte_protocol() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut seen = Vec::new();
            let mut buf = [0u8; 4];
            // motor down
            conn.read_exact(&mut buf).unwrap();
            seen.push(buf);
            // floor sensor query, answer floor 2
            conn.read_exact(&mut buf).unwrap();
            seen.push(buf);
            conn.write_all(&[7, 1, 2, 0]).unwrap();
            // call button query, answer pressed
            conn.read_exact(&mut buf).unwrap();
            seen.push(buf);
            conn.write_all(&[6, 1, 0, 0]).unwrap();
            seen
        });

        let mut elev = ElevatorServer::init(&addr, 4).unwrap();
        elev.motor_direction(Direction::Down).unwrap();
        assert_eq!(elev.floor_sensor().unwrap(), Some(2));
        assert!(elev.call_button(ButtonType::DOWN, 3).unwrap());

        let seen = server.join().unwrap();
        assert_eq!(seen[0], [1, 255, 0, 0]);
        assert_eq!(seen[1], [7, 0, 0, 0]);
        assert_eq!(seen[2], [6, 1, 3, 0]);
    }

    #[test]
    fn silent_server_fails_the_query_and_the_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = thread::spawn(move || {
            let (conn, _) = listener.accept().unwrap();
            // never answers
            thread::sleep(config::ELEV_IO_TIMEOUT * 4);
            drop(conn);
        });

        let mut elev = ElevatorServer::init(&addr, 4).unwrap();
        let started = std::time::Instant::now();
        assert!(elev.floor_sensor().is_err());
        assert!(started.elapsed() < config::ELEV_IO_TIMEOUT * 3);
        // the stream is out of step, later exchanges fail as well
        assert!(elev.stop_button().is_err());
        server.join().unwrap();
    }
}
