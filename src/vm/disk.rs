//! Hard-disk and DVD images

use crate::error::{Error, Result};
use crate::utils::paths::absolute_path;
use crate::vbox::parse::Record;
use crate::vbox::VirtualBox;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// On-disk format of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiskFormat {
    Raw,
    Vdi,
    Vmdk,
    Vhd,
}

impl DiskFormat {
    /// Name VBoxManage uses for the format.
    pub fn tool_name(self) -> &'static str {
        match self {
            DiskFormat::Raw => "RAW",
            DiskFormat::Vdi => "VDI",
            DiskFormat::Vmdk => "VMDK",
            DiskFormat::Vhd => "VHD",
        }
    }

    /// Format implied by the file extension; VDI when there is none.
    pub fn guess(file: &Path) -> Self {
        match extension(file).as_deref() {
            Some("vmdk") => DiskFormat::Vmdk,
            Some("vhd") => DiskFormat::Vhd,
            Some("iso") => DiskFormat::Raw,
            _ => DiskFormat::Vdi,
        }
    }
}

impl FromStr for DiskFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(DiskFormat::Raw),
            "vdi" => Ok(DiskFormat::Vdi),
            "vmdk" => Ok(DiskFormat::Vmdk),
            "vhd" => Ok(DiskFormat::Vhd),
            _ => Err(Error::invalid("disk format", s)),
        }
    }
}

/// What kind of drive an image goes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiskMedia {
    Disk,
    Dvd,
}

impl DiskMedia {
    /// Media kind implied by the file extension.
    pub fn guess(file: &Path) -> Self {
        match extension(file).as_deref() {
            Some("iso") => DiskMedia::Dvd,
            _ => DiskMedia::Disk,
        }
    }

    /// Device type for `openmedium` / `closemedium`.
    pub fn medium_kind(self) -> &'static str {
        match self {
            DiskMedia::Disk => "disk",
            DiskMedia::Dvd => "dvd",
        }
    }

    /// Drive type for `storageattach --type`.
    fn drive_kind(self) -> &'static str {
        match self {
            DiskMedia::Disk => "hdd",
            DiskMedia::Dvd => "dvddrive",
        }
    }
}

impl FromStr for DiskMedia {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "disk" => Ok(DiskMedia::Disk),
            "dvd" => Ok(DiskMedia::Dvd),
            other => Err(Error::invalid("disk media", other)),
        }
    }
}

/// Text after the last dot of the file name. Unlike `Path::extension`, a
/// bare `.iso` counts as having the `iso` extension.
fn extension(file: &Path) -> Option<String> {
    let name = file.file_name()?.to_str()?;
    let (_, ext) = name.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

/// Parameters for [`Disk::create`].
#[derive(Debug, Clone)]
pub struct CreateDiskParams {
    pub file: PathBuf,
    /// Image size, in bytes.
    pub size: u64,
    /// Guessed from the extension when `None`.
    pub format: Option<DiskFormat>,
    /// Allocate every block up front instead of growing on demand.
    pub prealloc: bool,
}

/// Descriptor for a disk or DVD image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disk {
    /// Absolute path of the image file.
    pub file: PathBuf,
    pub format: DiskFormat,
    pub media: DiskMedia,
    /// UUID the image is registered with, once known.
    pub uid: Option<String>,
}

impl Disk {
    /// Describes `file`, guessing format and media from its extension.
    ///
    /// Does not create or register anything.
    pub fn new(file: impl AsRef<Path>) -> Result<Disk> {
        Disk::with_kind(file, None, None)
    }

    pub fn with_kind(
        file: impl AsRef<Path>,
        format: Option<DiskFormat>,
        media: Option<DiskMedia>,
    ) -> Result<Disk> {
        let file = absolute_path(file.as_ref())?;
        Ok(Disk {
            format: format.unwrap_or_else(|| DiskFormat::guess(&file)),
            media: media.unwrap_or_else(|| DiskMedia::guess(&file)),
            file,
            uid: None,
        })
    }

    /// Creates the image file through VBoxManage.
    pub fn create(vbox: &VirtualBox, params: &CreateDiskParams) -> Result<Disk> {
        let file = absolute_path(&params.file)?;
        let format = params.format.unwrap_or_else(|| DiskFormat::guess(&file));
        let size_mb = params.size / (1024 * 1024);
        let variant = if params.prealloc { "Fixed" } else { "Standard" };
        let filename = file.to_string_lossy().into_owned();
        let size_arg = size_mb.to_string();

        let output = vbox.run_checked(&[
            "--nologo",
            "createhd",
            "--filename",
            filename.as_str(),
            "--size",
            size_arg.as_str(),
            "--format",
            format.tool_name(),
            "--variant",
            variant,
        ])?;
        let uid = output
            .lines()
            .find_map(|line| line.split_once("UUID:").map(|(_, uid)| uid.trim().to_string()))
            .filter(|uid| !uid.is_empty())
            .ok_or_else(|| Error::Parse(format!("createhd did not report a UUID:\n{output}")))?;

        tracing::info!(file = %file.display(), %uid, "disk image created");
        Ok(Disk {
            file,
            format,
            media: DiskMedia::Disk,
            uid: Some(uid),
        })
    }

    /// Removes the image file. Does not detach or unregister the image.
    pub fn drop_file(&self) -> Result<()> {
        if self.file.exists() {
            fs::remove_file(&self.file)?;
        }
        Ok(())
    }

    /// True if VirtualBox knows this image; adopts the registered UUID.
    pub fn is_registered(&mut self, vbox: &VirtualBox) -> Result<bool> {
        let images = match self.media {
            DiskMedia::Disk => Disk::registered_hdds(vbox)?,
            DiskMedia::Dvd => Disk::registered_dvds(vbox)?,
        };
        match images.into_iter().find(|image| image.file == self.file) {
            Some(image) => {
                self.uid = image.uid;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Registers the image with VirtualBox, replacing any earlier registration.
    pub fn register(&mut self, vbox: &VirtualBox) -> Result<()> {
        if self.is_registered(vbox)? {
            self.unregister(vbox)?;
        }
        let uid = self
            .uid
            .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .clone();
        let file = self.file.to_string_lossy().into_owned();

        let mut args = vec!["openmedium", self.media.medium_kind(), file.as_str()];
        if self.media == DiskMedia::Disk {
            args.extend(["--type", "normal"]);
        }
        args.extend(["--uuid", uid.as_str()]);
        vbox.run_checked(&args)?;
        Ok(())
    }

    /// Forgets the image in VirtualBox. Returns false if it was not
    /// registered; any other refusal is an [`Error::Command`].
    pub fn unregister(&self, vbox: &VirtualBox) -> Result<bool> {
        let file = self.file.to_string_lossy().into_owned();
        let result = vbox.run(&["closemedium", self.media.medium_kind(), file.as_str()])?;
        if result.success() {
            tracing::info!(file = %self.file.display(), "disk image unregistered");
            return Ok(true);
        }
        if self.clone().is_registered(vbox)? {
            tracing::warn!(file = %self.file.display(), status = result.status, "closemedium failed");
            return result.into_checked().map(|_| true);
        }
        Ok(false)
    }

    /// Connects the image to a storage controller of a registered VM.
    pub fn attach_to(
        &self,
        vbox: &VirtualBox,
        vm_uid: &str,
        bus_name: &str,
        port: u32,
        device: u32,
    ) -> Result<()> {
        let args = vec![
            "--nologo".to_string(),
            "storageattach".to_string(),
            vm_uid.to_string(),
            "--storagectl".to_string(),
            bus_name.to_string(),
            "--port".to_string(),
            port.to_string(),
            "--device".to_string(),
            device.to_string(),
            "--type".to_string(),
            self.media.drive_kind().to_string(),
            "--medium".to_string(),
            self.file.to_string_lossy().into_owned(),
        ];
        vbox.run_checked(&args)?;
        Ok(())
    }

    /// Every registered image, hard disks first.
    pub fn registered(vbox: &VirtualBox) -> Result<Vec<Disk>> {
        let mut disks = Disk::registered_hdds(vbox)?;
        disks.extend(Disk::registered_dvds(vbox)?);
        Ok(disks)
    }

    pub fn registered_hdds(vbox: &VirtualBox) -> Result<Vec<Disk>> {
        Ok(vbox
            .list_long("hdds")?
            .iter()
            .filter_map(|r| Disk::from_disk_info(r, DiskMedia::Disk))
            .collect())
    }

    pub fn registered_dvds(vbox: &VirtualBox) -> Result<Vec<Disk>> {
        Ok(vbox
            .list_long("dvds")?
            .iter()
            .filter_map(|r| Disk::from_disk_info(r, DiskMedia::Dvd))
            .collect())
    }

    /// Decodes one record of `list --long hdds|dvds`.
    fn from_disk_info(info: &Record, media: DiskMedia) -> Option<Disk> {
        let file = PathBuf::from(info.get("Location")?);
        let format = info
            .get("Format")
            .and_then(|f| f.parse().ok())
            .unwrap_or_else(|| DiskFormat::guess(&file));
        Some(Disk {
            file,
            format,
            media,
            uid: info.get("UUID").cloned(),
        })
    }
}
