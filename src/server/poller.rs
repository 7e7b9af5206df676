//! # Multiplexor de Readiness
//! src/server/poller.rs
//!
//! Envoltorio fino sobre epoll. Cada registro lleva un `Token` de 64 bits
//! que identifica de quién es el descriptor: el socket de escucha, el socket
//! de un cliente o el timer de un cliente.
//!
//! `add`/`modify`/`delete` se pueden llamar desde cualquier thread, también
//! mientras el reactor está bloqueado en `wait`.

use nix::errno::Errno;
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};
use std::io;
use std::os::fd::AsFd;

/// Máximo de eventos devueltos por `wait`
pub const MAX_EVENTS: usize = 4096;

/// Identifica el dueño de un descriptor registrado
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token {
    Listener,
    Client(u64),
    Timer(u64),
}

impl Token {
    const LISTENER: u64 = u64::MAX;

    /// Codifica el token: el bit bajo distingue socket (0) de timer (1)
    pub fn to_u64(self) -> u64 {
        match self {
            Token::Listener => Self::LISTENER,
            Token::Client(id) => id << 1,
            Token::Timer(id) => (id << 1) | 1,
        }
    }

    pub fn from_u64(raw: u64) -> Self {
        if raw == Self::LISTENER {
            Token::Listener
        } else if raw & 1 == 0 {
            Token::Client(raw >> 1)
        } else {
            Token::Timer(raw >> 1)
        }
    }
}

/// Interés de un socket de cliente: lectura, edge-triggered, one-shot, más
/// cierre del otro extremo
pub fn client_interest() -> EpollFlags {
    EpollFlags::EPOLLET
        | EpollFlags::EPOLLIN
        | EpollFlags::EPOLLONESHOT
        | EpollFlags::EPOLLRDHUP
        | EpollFlags::EPOLLHUP
}

/// Interés de un timer: lectura, edge-triggered, one-shot
pub fn timer_interest() -> EpollFlags {
    EpollFlags::EPOLLET | EpollFlags::EPOLLIN | EpollFlags::EPOLLONESHOT
}

/// Interés del socket de escucha
pub fn listener_interest() -> EpollFlags {
    EpollFlags::EPOLLET | EpollFlags::EPOLLIN
}

pub struct Poller {
    epoll: Epoll,
}

impl Poller {
    pub fn new() -> io::Result<Self> {
        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC)?;
        Ok(Self { epoll })
    }

    pub fn add<F: AsFd>(&self, fd: F, token: Token, interest: EpollFlags) -> io::Result<()> {
        self.epoll
            .add(fd, EpollEvent::new(interest, token.to_u64()))
            .map_err(io::Error::from)
    }

    /// Cambia el interés; con `EpollFlags::empty()` el descriptor queda mudo
    pub fn modify<F: AsFd>(&self, fd: F, token: Token, interest: EpollFlags) -> io::Result<()> {
        let mut event = EpollEvent::new(interest, token.to_u64());
        self.epoll.modify(fd, &mut event).map_err(io::Error::from)
    }

    pub fn delete<F: AsFd>(&self, fd: F) -> io::Result<()> {
        self.epoll.delete(fd).map_err(io::Error::from)
    }

    /// Bloquea hasta que haya eventos listos
    ///
    /// Devuelve el `Errno` crudo para que el llamador distinga `EINTR`.
    pub fn wait(&self, events: &mut [EpollEvent]) -> Result<usize, Errno> {
        self.epoll.wait(events, EpollTimeout::NONE)
    }

    /// Como `wait` pero con límite de tiempo en milisegundos
    pub fn wait_timeout(&self, events: &mut [EpollEvent], millis: u16) -> Result<usize, Errno> {
        self.epoll.wait(events, EpollTimeout::from(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::net::UnixStream;

    #[test]
    fn test_token_round_trip() {
        for token in [Token::Listener, Token::Client(0), Token::Client(41), Token::Timer(41)] {
            assert_eq!(Token::from_u64(token.to_u64()), token);
        }
        assert_ne!(Token::Client(3).to_u64(), Token::Timer(3).to_u64());
    }

    #[test]
    fn test_one_shot_needs_rearm() {
        let poller = Poller::new().unwrap();
        let (a, mut b) = UnixStream::pair().unwrap();
        let mut events = vec![EpollEvent::empty(); 8];

        poller.add(&a, Token::Client(7), client_interest()).unwrap();
        b.write_all(b"x").unwrap();

        let n = poller.wait_timeout(&mut events, 1000).unwrap();
        assert_eq!(n, 1);
        assert_eq!(Token::from_u64(events[0].data()), Token::Client(7));

        // Sin re-armar no vuelve a notificar
        b.write_all(b"y").unwrap();
        assert_eq!(poller.wait_timeout(&mut events, 50).unwrap(), 0);

        poller.modify(&a, Token::Client(7), client_interest()).unwrap();
        assert_eq!(poller.wait_timeout(&mut events, 1000).unwrap(), 1);
    }

    #[test]
    fn test_muted_descriptor_is_silent() {
        let poller = Poller::new().unwrap();
        let (a, mut b) = UnixStream::pair().unwrap();
        let mut events = vec![EpollEvent::empty(); 8];

        poller.add(&a, Token::Timer(1), timer_interest()).unwrap();
        poller.modify(&a, Token::Timer(1), EpollFlags::empty()).unwrap();
        b.write_all(b"x").unwrap();
        assert_eq!(poller.wait_timeout(&mut events, 50).unwrap(), 0);

        poller.delete(&a).unwrap();
    }
}
