/// Counters accumulated over one run.
#[derive(Debug, Default)]
pub struct RunStats {
    pub selected: u32,
    pub claimed: u32,
    pub processed: u32,
    pub failed: u32,
    pub deduped: u32,
    pub embedded: u32,
    pub reused_vectors: u32,
    pub clusters_created: u32,
    pub summarized: u32,
    pub flagged: u32,
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Run Complete ===")?;
        writeln!(f, "Entries selected:  {}", self.selected)?;
        writeln!(f, "Jobs claimed:      {}", self.claimed)?;
        writeln!(f, "Processed:         {}", self.processed)?;
        writeln!(f, "Failed:            {}", self.failed)?;
        writeln!(f, "Duplicates:        {}", self.deduped)?;
        writeln!(f, "Embedded:          {}", self.embedded)?;
        if self.reused_vectors > 0 {
            writeln!(f, "Vectors reused:    {}", self.reused_vectors)?;
        }
        writeln!(f, "Clusters created:  {}", self.clusters_created)?;
        writeln!(f, "Clusters written:  {}", self.summarized)?;
        writeln!(f, "Hotspots flagged:  {}", self.flagged)?;
        Ok(())
    }
}
