use sim_proto::ClientMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Reports drawable geometry so the server can keep molecules inside the
/// visible area. Reports are fire-and-forget; each one supersedes the last.
#[derive(Debug, Clone)]
pub struct ViewportNegotiator {
    radius_px: u32,
    current: Option<Viewport>,
}

impl ViewportNegotiator {
    pub fn new(radius_px: u32) -> Self {
        Self {
            radius_px,
            current: None,
        }
    }

    pub fn current(&self) -> Option<Viewport> {
        self.current
    }

    pub fn radius_px(&self) -> u32 {
        self.radius_px
    }

    /// The report for the current geometry, if any is known.
    pub fn report(&self) -> Option<ClientMessage> {
        self.current.map(|viewport| ClientMessage::Viewport {
            width: viewport.width,
            height: viewport.height,
            radius_px: self.radius_px,
        })
    }

    /// A new connection always gets the current geometry.
    pub fn on_connect(&self) -> Option<ClientMessage> {
        self.report()
    }

    /// Record new geometry; returns a report only when it changed.
    pub fn resize(&mut self, width: u32, height: u32) -> Option<ClientMessage> {
        let next = Viewport { width, height };
        if self.current == Some(next) {
            return None;
        }
        self.current = Some(next);
        self.report()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_only_known_geometry() {
        let mut negotiator = ViewportNegotiator::new(3);
        assert_eq!(negotiator.on_connect(), None);
        let report = negotiator.resize(640, 480);
        assert_eq!(
            report,
            Some(ClientMessage::Viewport {
                width: 640,
                height: 480,
                radius_px: 3
            })
        );
        assert_eq!(negotiator.on_connect(), report);
    }

    #[test]
    fn unchanged_geometry_is_not_resent() {
        let mut negotiator = ViewportNegotiator::new(4);
        assert!(negotiator.resize(100, 50).is_some());
        assert!(negotiator.resize(100, 50).is_none());
        assert!(negotiator.resize(100, 60).is_some());
        assert_eq!(
            negotiator.current(),
            Some(Viewport {
                width: 100,
                height: 60
            })
        );
    }
}
