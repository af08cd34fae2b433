#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parameters {
    /// Whether records for all-zero slots should be left out of the dump.
    pub skip_unused: bool,

    /// Whether each decoded record should be followed by the raw quadword(s) it came from.
    pub raw: bool,
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters {
            skip_unused: false,
            raw: false,
        }
    }
}

impl Parameters {
    /// Parses whitespace-separated dump arguments, e.g. from a firmware shell or boot option.
    pub fn parse(args: &str) -> Self {
        let mut params = Self::default();

        for arg in args.split_whitespace() {
            match arg {
                "--skip-unused" => params.skip_unused = true,

                "--raw" => params.raw = true,

                arg => {
                    warn!("Unknown dump argument: {arg:?}");
                }
            }
        }

        debug!("Dump parameters: {params:?}");

        params
    }
}
